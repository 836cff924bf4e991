//! Tagged-variant value type for configuration documents
//!
//! Documents are parsed from TOML into [`ConfigValue`] trees. Mappings use
//! `BTreeMap` so that nothing downstream depends on insertion or hash order.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A configuration mapping with case-sensitive, ordered keys
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<ConfigValue>),
    Map(ConfigMap),
}

impl ConfigValue {
    /// Human-readable name of the variant, used in validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "string",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Boolean(_) => "boolean",
            ConfigValue::List(_) => "list",
            ConfigValue::Map(_) => "mapping",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a direct child of a mapping value
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Walks a path of mapping keys starting at this value
    pub fn lookup(&self, path: &[&str]) -> Option<&ConfigValue> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Reads a string or a list of strings as a list
    ///
    /// A single string is an implicit one-element list. Returns `None` if the
    /// value is neither, or if a list contains non-string items.
    pub fn string_list(&self) -> Option<Vec<String>> {
        match self {
            ConfigValue::String(s) => Some(vec![s.clone()]),
            ConfigValue::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s),
            toml::Value::Integer(i) => ConfigValue::Integer(i),
            toml::Value::Float(f) => ConfigValue::Float(f),
            toml::Value::Boolean(b) => ConfigValue::Boolean(b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => {
                ConfigValue::List(items.into_iter().map(ConfigValue::from).collect())
            }
            toml::Value::Table(table) => ConfigValue::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

/// Scalars print bare; lists and mappings print as JSON.
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => write!(f, "{s}"),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Float(x) => write!(f, "{x}"),
            ConfigValue::Boolean(b) => write!(f, "{b}"),
            other => {
                let json = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                write!(f, "{json}")
            }
        }
    }
}
