use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "tunnelconf",
    about = "Encrypted store for VPN tunnel configurations",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the names of all stored tunnels.
    List,
    /// Print a stored tunnel configuration.
    Show {
        name: String,
        /// Print as JSON instead of configuration text.
        #[arg(long)]
        json: bool,
    },
    /// Import a `.conf` or `.conf.dpapi` file into the store.
    Import {
        path: PathBuf,
        /// Store under this name instead of the one in the file name.
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing tunnel with the same name.
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a stored tunnel.
    Delete { name: String },
    /// Print where a tunnel's sealed file lives.
    Path { name: String },
    /// Encrypt legacy plaintext `.conf` files left in the store directory.
    Migrate {
        /// How many delayed retries contention on a locked file may trigger.
        #[arg(long)]
        budget: Option<u32>,
    },
    /// Run a health check of the store directory and the sealing key.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args)
            .expect("parse should succeed")
            .command
    }

    #[test]
    fn parses_list_and_health() {
        assert_eq!(parse(&["tunnelconf", "list"]), Command::List);
        assert_eq!(parse(&["tunnelconf", "health"]), Command::Health);
    }

    #[test]
    fn parses_show_with_json_flag() {
        assert_eq!(
            parse(&["tunnelconf", "show", "home", "--json"]),
            Command::Show {
                name: "home".into(),
                json: true
            }
        );
    }

    #[test]
    fn parses_import_options() {
        assert_eq!(
            parse(&[
                "tunnelconf",
                "import",
                "/tmp/office.conf",
                "--name",
                "work",
                "--overwrite"
            ]),
            Command::Import {
                path: PathBuf::from("/tmp/office.conf"),
                name: Some("work".into()),
                overwrite: true,
            }
        );
    }

    #[test]
    fn parses_migrate_budget() {
        assert_eq!(
            parse(&["tunnelconf", "migrate"]),
            Command::Migrate { budget: None }
        );
        assert_eq!(
            parse(&["tunnelconf", "migrate", "--budget", "5"]),
            Command::Migrate { budget: Some(5) }
        );
    }

    #[test]
    fn parses_delete_path_and_config_init() {
        assert_eq!(
            parse(&["tunnelconf", "delete", "home"]),
            Command::Delete {
                name: "home".into()
            }
        );
        assert_eq!(
            parse(&["tunnelconf", "path", "home"]),
            Command::Path {
                name: "home".into()
            }
        );
        assert_eq!(
            parse(&["tunnelconf", "config", "init"]),
            Command::Config(ConfigCommand::Init)
        );
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["tunnelconf"]).is_err());
    }
}
