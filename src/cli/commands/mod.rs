//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod classify;
pub mod convert;
pub mod get;
pub mod tags;
pub mod validate;

use super::{EXIT_CONFIG, EXIT_FATAL};
use crate::config::{load_config, ConfigResolver};
use crate::domain::{DatmanError, Result};
use crate::ids::{IdScheme, ScanId};

/// Exit code for a library error
pub fn exit_code(err: &DatmanError) -> i32 {
    if err.is_configuration() {
        EXIT_CONFIG
    } else {
        EXIT_FATAL
    }
}

/// Loads the configuration, printing the failure and returning the exit code
/// if it cannot be loaded
pub(crate) fn load_or_report(
    config_path: &str,
    system: &str,
) -> std::result::Result<ConfigResolver, i32> {
    load_config(config_path, system).map_err(|e| {
        crate::log_error_with_context!(&e, "Failed to load configuration");
        eprintln!("❌ Failed to load configuration from {config_path}");
        eprintln!("   Error: {e}");
        exit_code(&e)
    })
}

/// Study and site a session identifier belongs to
///
/// The site is reported in Datman naming, and only when the study declares
/// it. With `study` given, only the site is inferred.
pub(crate) fn session_context(
    resolver: &ConfigResolver,
    study: Option<&str>,
    id: &ScanId,
    scheme: IdScheme,
) -> Result<(String, Option<String>)> {
    let study = match study {
        Some(study) => study.to_string(),
        None => resolver.project_for_id(id, scheme)?.to_string(),
    };
    let site = resolver.site_for_id(&study, id, scheme)?;
    Ok((study, site))
}
