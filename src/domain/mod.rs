//! Domain types shared by every Datman component.
//!
//! The domain layer provides:
//! - **Error types** ([`DatmanError`]) and the [`Result`] alias
//! - **Error context** ([`ResultExt`]) for wrapping lower-level failures
//! - **Query context** ([`StudyContext`]) naming the study and site a call is for
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, DatmanError>`]:
//!
//! ```rust
//! use datman::domain::{DatmanError, Result, StudyContext};
//!
//! fn require_site(site: Option<&str>) -> Result<&str> {
//!     site.ok_or_else(|| DatmanError::config("a site is required", &StudyContext::study("SPINS")))
//! }
//! ```

pub mod context;
pub mod errors;
pub mod result;
pub mod study;

// Re-export commonly used types for convenience
pub use context::ResultExt;
pub use errors::DatmanError;
pub use result::Result;
pub use study::StudyContext;
