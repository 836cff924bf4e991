//! Immutable configuration documents and their origins

use super::value::{ConfigMap, ConfigValue};
use crate::domain::{DatmanError, Result, StudyContext};
use serde::Serialize;
use std::fmt;

/// Precedence level a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Origin {
    /// The system document (including the active `SystemSettings` block)
    System,
    /// Top level of a study document
    Study,
    /// A site block nested inside a study document
    Site,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::System => "system",
            Origin::Study => "study",
            Origin::Site => "site",
        };
        write!(f, "{name}")
    }
}

/// A parsed configuration document
///
/// Documents are never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    source: String,
    root: ConfigMap,
}

impl ConfigDocument {
    /// Parses a TOML document
    ///
    /// `source` names the document (usually its path) in error messages.
    pub fn from_toml_str(text: &str, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let table: toml::Table = toml::from_str(text).map_err(|e| {
            DatmanError::config(
                format!("Failed to parse {source}: {e}"),
                &StudyContext::global(),
            )
        })?;

        let root = table
            .into_iter()
            .map(|(k, v)| (k, ConfigValue::from(v)))
            .collect();

        Ok(Self { source, root })
    }

    /// Wraps an already-built mapping
    pub fn from_map(root: ConfigMap, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &ConfigMap {
        &self.root
    }

    /// Looks up a top-level key
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.root.get(key)
    }

    /// Looks up a path of keys
    pub fn lookup(&self, path: &[&str]) -> Option<&ConfigValue> {
        let (first, rest) = path.split_first()?;
        self.root.get(*first)?.lookup(rest)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }
}
