//! Domain error types
//!
//! This module defines the error hierarchy for Datman. Every variant that can
//! be traced back to a configuration entry carries the offending key, tag or
//! identifier together with the `(study, site)` context it was raised in, so
//! the faulty document entry can be located from the message alone.

use crate::domain::study::StudyContext;
use crate::ids::Direction;
use thiserror::Error;

/// Main Datman error type
#[derive(Debug, Error)]
pub enum DatmanError {
    /// Malformed or inconsistent configuration (unknown tags, duplicate
    /// study tags, unknown study or site, bad value types)
    #[error("Configuration error{context}: {message}")]
    Config {
        message: String,
        context: StudyContext,
    },

    /// A setting declared as required is absent at every precedence level
    #[error("Missing required setting '{key}'{context}")]
    MissingRequiredSetting { key: String, context: StudyContext },

    /// An author-supplied match pattern failed to compile
    #[error("Invalid pattern '{pattern}' for tag '{tag}'{context}: {reason}")]
    Pattern {
        tag: String,
        pattern: String,
        reason: String,
        context: StudyContext,
    },

    /// An identifier does not satisfy the conversion rule for a direction
    #[error("Cannot convert '{identifier}' ({direction}){context}: {reason}")]
    UnconvertibleId {
        identifier: String,
        direction: Direction,
        reason: String,
        context: StudyContext,
    },

    /// An identifier string is not in the expected naming scheme
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl DatmanError {
    /// Creates a configuration error for the given context
    pub fn config(message: impl Into<String>, context: &StudyContext) -> Self {
        DatmanError::Config {
            message: message.into(),
            context: context.clone(),
        }
    }

    /// Creates a missing required setting error for the given context
    pub fn missing(key: impl Into<String>, context: &StudyContext) -> Self {
        DatmanError::MissingRequiredSetting {
            key: key.into(),
            context: context.clone(),
        }
    }

    /// True for errors caused by configuration authoring mistakes
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DatmanError::Config { .. }
                | DatmanError::MissingRequiredSetting { .. }
                | DatmanError::Pattern { .. }
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for DatmanError {
    fn from(err: std::io::Error) -> Self {
        DatmanError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DatmanError {
    fn from(err: serde_json::Error) -> Self {
        DatmanError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DatmanError {
    fn from(err: toml::de::Error) -> Self {
        DatmanError::Config {
            message: format!("TOML parse error: {err}"),
            context: StudyContext::global(),
        }
    }
}
