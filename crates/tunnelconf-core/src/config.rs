use serde::{Deserialize, Serialize};

/// One `[Section]` of a tunnel configuration with its entries in file order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Builder-style append, handy for constructing records in code and tests.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// First value for `key` (keys compare case-insensitively).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A named tunnel configuration record.
///
/// The name is the only key into the store. Records are transient: they are
/// produced by decoding a file and have no existence apart from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    pub sections: Vec<Section>,
}

impl Config {
    pub fn new(name: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            name: name.into(),
            sections,
        }
    }

    /// First section called `name` (case-insensitive).
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Same data under another name; the store treats this as a new record.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: self.sections.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let cfg = Config::new(
            "office",
            vec![Section::new("Interface").with("PrivateKey", "abc")],
        );
        let iface = cfg.section("interface").expect("section");
        assert_eq!(iface.get("privatekey"), Some("abc"));
        assert_eq!(iface.get("Address"), None);
        assert!(cfg.section("Peer").is_none());
    }

    #[test]
    fn renamed_keeps_sections() {
        let cfg = Config::new("a", vec![Section::new("Peer").with("Endpoint", "x:1")]);
        let other = cfg.renamed("b");
        assert_eq!(other.name, "b");
        assert_eq!(other.sections, cfg.sections);
    }
}
