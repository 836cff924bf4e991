//! Configuration loader with TOML parsing and environment variable substitution
//!
//! The system document lists every study under `Projects` as
//! `Name = "<file name>"`. Study documents are read from the active
//! deployment's `ConfigDir` when it is set, otherwise from the directory
//! containing the system document.

use super::document::ConfigDocument;
use super::resolver::ConfigResolver;
use super::value::ConfigValue;
use crate::domain::{DatmanError, Result, StudyContext};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the system document
pub const CONFIG_ENV: &str = "DM_CONFIG";

/// Environment variable naming the active deployment
pub const SYSTEM_ENV: &str = "DM_SYSTEM";

/// Loads the system document, every registered study document, and builds a
/// validated [`ConfigResolver`] for deployment `system`
///
/// # Errors
///
/// Returns an error if:
/// - a document cannot be read or parsed
/// - a `${VAR}` placeholder names an unset environment variable
/// - any document fails validation
///
/// # Examples
///
/// ```no_run
/// use datman::config::load_config;
///
/// let resolver = load_config("main_config.toml", "local").expect("Failed to load config");
/// println!("{:?}", resolver.projects().collect::<Vec<_>>());
/// ```
pub fn load_config(path: impl AsRef<Path>, system: &str) -> Result<ConfigResolver> {
    let path = path.as_ref();
    let system_doc = read_document(path)?;

    let config_dir = study_config_dir(&system_doc, system, path);

    let mut studies = BTreeMap::new();
    if let Some(projects) = system_doc.get("Projects").and_then(ConfigValue::as_map) {
        for (name, file) in projects {
            let Some(file) = file.as_str() else {
                // Reported with context by validation in ConfigResolver::new
                continue;
            };
            let study_path = config_dir.join(file);
            tracing::debug!(study = %name, path = %study_path.display(), "Reading study document");
            let document = read_document(&study_path).map_err(|e| match e {
                DatmanError::Config { message, .. } => {
                    DatmanError::config(message, &StudyContext::study(name.as_str()))
                }
                other => other,
            })?;
            studies.insert(name.clone(), document);
        }
    }

    ConfigResolver::new(system_doc, system, studies)
}

/// Loads configuration from `DM_CONFIG` and `DM_SYSTEM`
///
/// # Errors
///
/// Returns a configuration error if either variable is unset.
pub fn load_from_env() -> Result<ConfigResolver> {
    let global = StudyContext::global();
    let path = std::env::var(CONFIG_ENV)
        .map_err(|_| DatmanError::config(format!("{CONFIG_ENV} is not set"), &global))?;
    let system = std::env::var(SYSTEM_ENV)
        .map_err(|_| DatmanError::config(format!("{SYSTEM_ENV} is not set"), &global))?;
    load_config(path, &system)
}

/// Reads one TOML document, substituting `${VAR}` placeholders first
pub fn read_document(path: &Path) -> Result<ConfigDocument> {
    let global = StudyContext::global();

    if !path.exists() {
        return Err(DatmanError::config(
            format!("Configuration file not found: {}", path.display()),
            &global,
        ));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DatmanError::config(
            format!("Failed to read configuration file {}: {}", path.display(), e),
            &global,
        )
    })?;

    let contents = substitute_env_vars(&contents).map_err(|e| match e {
        DatmanError::Config { message, context } => DatmanError::Config {
            message: format!("{}: {message}", path.display()),
            context,
        },
        other => other,
    })?;

    ConfigDocument::from_toml_str(&contents, path.display().to_string())
}

fn study_config_dir(system_doc: &ConfigDocument, system: &str, path: &Path) -> PathBuf {
    let configured = system_doc
        .lookup(&["SystemSettings", system, "ConfigDir"])
        .or_else(|| system_doc.get("ConfigDir"))
        .and_then(ConfigValue::as_str);

    match configured {
        Some(dir) => PathBuf::from(dir),
        None => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| DatmanError::Other(e.to_string()))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(DatmanError::config(
            format!(
                "Missing required environment variables: {}",
                missing_vars.join(", ")
            ),
            &StudyContext::global(),
        ));
    }

    Ok(result)
}
