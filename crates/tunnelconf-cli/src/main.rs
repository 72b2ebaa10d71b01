mod cli;
mod config;
mod storage;

use std::{
    io::{self, Write},
    path::Path,
};

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tunnelconf_core::{ConfigFormat, Sealer};
use tunnelconf_storage::{ConfigStore, MigrationEngine};

use crate::cli::{Command, ConfigCommand};

const HEALTH_PROBE_NAME: &str = "health-probe";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let mut out = io::stdout().lock();

    match cli.command {
        Command::List => list(&storage::store_from_config(&config)?, &mut out)?,
        Command::Show { name, json } => {
            show(&storage::store_from_config(&config)?, &name, json, &mut out).await?
        }
        Command::Import {
            path,
            name,
            overwrite,
        } => {
            let store = storage::store_from_config(&config)?;
            import(&store, &path, name.as_deref(), overwrite, &mut out).await?
        }
        Command::Delete { name } => {
            storage::store_from_config(&config)?
                .delete_by_name(&name)
                .wrap_err_with(|| format!("deleting tunnel {name}"))?;
            writeln!(out, "Deleted {name}")?;
        }
        Command::Path { name } => print_path(&storage::store_from_config(&config)?, &name, &mut out)?,
        Command::Migrate { budget } => {
            let engine = storage::migration_engine(&config)?;
            let budget = budget.unwrap_or_else(|| config.migration_budget());
            migrate(&engine, budget, &mut out).await?
        }
        Command::Health => {
            health(&storage::store_from_config(&config)?, &mut out).await?;
        }
        Command::Config(ConfigCommand::Init) => {
            let path = config::write_default_if_missing(&config::Config::default())?;
            writeln!(out, "Config initialized at {}", path.display())?;
        }
        Command::Version => writeln!(out, "tunnelconf {}", env!("CARGO_PKG_VERSION"))?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn list<S: Sealer, F: ConfigFormat>(store: &ConfigStore<S, F>, out: &mut impl Write) -> Result<()> {
    let mut names = store.list_names()?;
    names.sort();
    if names.is_empty() {
        writeln!(out, "No tunnels yet. Add one with `tunnelconf import <file>`.")?;
    }
    for name in names {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

fn print_path<S: Sealer, F: ConfigFormat>(
    store: &ConfigStore<S, F>,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    let path = store.path_for_name(name)?;
    writeln!(out, "{}", path.display())?;
    Ok(())
}

async fn show<S: Sealer, F: ConfigFormat>(
    store: &ConfigStore<S, F>,
    name: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let config = store
        .load_by_name(name)
        .await
        .wrap_err_with(|| format!("loading tunnel {name}"))?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &config)?;
        writeln!(out)?;
    } else {
        out.write_all(&store.format().encode(&config))?;
    }
    Ok(())
}

async fn import<S: Sealer, F: ConfigFormat>(
    store: &ConfigStore<S, F>,
    path: &Path,
    rename: Option<&str>,
    overwrite: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut config = store
        .load_by_path(path)
        .await
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    if let Some(name) = rename {
        config = config.renamed(name);
    }
    store
        .save(&config, overwrite)
        .await
        .wrap_err_with(|| format!("saving tunnel {}", config.name))?;
    writeln!(out, "Imported {}", config.name)?;
    Ok(())
}

async fn migrate<S, F>(engine: &MigrationEngine<S, F>, budget: u32, out: &mut impl Write) -> Result<()>
where
    S: Sealer + 'static,
    F: ConfigFormat + 'static,
{
    let report = engine.migrate(budget).await;
    writeln!(out, "Migrated {} configuration(s)", report.migrated())?;
    for err in report.errors() {
        writeln!(out, "  error: {err}")?;
    }

    let coordinator = engine.coordinator();
    if coordinator.retry_timer().is_pending() {
        writeln!(out, "Waiting for locked files to be released...")?;
        coordinator.wait_for_retries().await;
        let remaining = engine
            .store()
            .names()
            .legacy_candidates(std::fs::read_dir(engine.store().directory())?);
        writeln!(out, "{} legacy file(s) remain", remaining.len())?;
    }
    Ok(())
}

/// Checks that the directory can be listed and that sealing round-trips.
async fn health<S: Sealer, F: ConfigFormat>(
    store: &ConfigStore<S, F>,
    out: &mut impl Write,
) -> Result<()> {
    let count = store.list_names()?.len();
    let payload = b"ok";
    let sealed = store.sealer().seal(payload, HEALTH_PROBE_NAME).await?;
    let opened = store.sealer().unseal(&sealed, HEALTH_PROBE_NAME).await?;
    if opened != payload {
        color_eyre::eyre::bail!("sealing round-trip failed");
    }
    writeln!(out, "Directory: {} ({count} tunnels)", store.directory().display())?;
    writeln!(out, "Sealing: ok")?;
    Ok(())
}
