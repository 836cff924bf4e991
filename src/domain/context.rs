//! Error context extension trait
//!
//! Similar to `anyhow::Context`, but keeps `Result<T, DatmanError>` so library
//! code never erases the error taxonomy. Configuration errors stay
//! configuration errors when context is added; everything else is wrapped in
//! [`DatmanError::Other`].
//!
//! # Examples
//!
//! ```rust
//! use datman::domain::Result;
//! use datman::domain::context::ResultExt;
//!
//! fn read_document(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_context(|| format!("Failed to read configuration document {path}"))
//! }
//! ```

use crate::domain::errors::DatmanError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error (evaluated eagerly)
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error using a closure, evaluated only on failure
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<DatmanError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| wrap(e.into(), context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

fn wrap(base: DatmanError, context: impl std::fmt::Display) -> DatmanError {
    match base {
        DatmanError::Config {
            message,
            context: scope,
        } => DatmanError::Config {
            message: format!("{context}: {message}"),
            context: scope,
        },
        other => DatmanError::Other(format!("{context}: {other}")),
    }
}
