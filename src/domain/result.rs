//! Result type alias for Datman
//!
//! This module provides a convenient Result type alias that uses DatmanError
//! as the error type.

use super::errors::DatmanError;

/// Result type alias for Datman operations
///
/// # Examples
///
/// ```
/// use datman::domain::result::Result;
/// use datman::domain::errors::DatmanError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(DatmanError::InvalidId("ZZZ999".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, DatmanError>;
