//! Logging and observability
//!
//! Structured logging through `tracing`:
//! - human-readable console output
//! - optional JSON logs in a rolling file
//! - level selected by `--log-level`, `DM_LOG_LEVEL` or `RUST_LOG`
//!
//! # Example
//!
//! ```no_run
//! use datman::logging::init_logging;
//! use datman::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(study = "SPINS", "Classifying session");
//! ```

pub mod structured;

pub use structured::{init_logging, parse_log_level, LoggingGuard};

/// Log a session whose observed series count differs from the declared Count
///
/// # Example
///
/// ```no_run
/// use datman::log_count_mismatch;
/// use datman::classify::CountMismatch;
/// use datman::domain::StudyContext;
///
/// let mismatch = CountMismatch { tag: "RST".to_string(), expected: 3, observed: 2 };
/// log_count_mismatch!(&mismatch, &StudyContext::site("SPINS", "CMH"));
/// ```
#[macro_export]
macro_rules! log_count_mismatch {
    ($mismatch:expr, $context:expr) => {
        tracing::warn!(
            tag = %$mismatch.tag,
            expected = $mismatch.expected,
            observed = $mismatch.observed,
            study = ?$context.study,
            site = ?$context.site,
            "Series count does not match expected count"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use datman::log_error_with_context;
/// use datman::domain::{DatmanError, StudyContext};
///
/// let error = DatmanError::config("SystemSettings is empty", &StudyContext::global());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log progress through a batch of sessions
///
/// # Example
///
/// ```no_run
/// use datman::log_batch_progress;
///
/// log_batch_progress!(10, 40);
/// ```
#[macro_export]
macro_rules! log_batch_progress {
    ($current:expr, $total:expr) => {
        tracing::debug!(
            current = $current,
            total = $total,
            progress_pct = ($current as f64 / $total as f64 * 100.0),
            "Processing session batch"
        );
    };
}
