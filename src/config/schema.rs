//! Configuration schema: the closed key vocabulary and load-time validation
//!
//! Documents are loosely typed on disk. Everything the resolver later relies
//! on is checked here once, when the documents are loaded, so that queries
//! never have to second-guess the shape of a value.

use super::document::ConfigDocument;
use super::tags::parse_entries;
use super::value::{ConfigMap, ConfigValue};
use crate::domain::{DatmanError, Result, StudyContext};
use crate::ids::IdMapping;
use serde::{Deserialize, Serialize};

/// Top-level setting names Datman understands
pub const KNOWN_KEYS: &[&str] = &[
    "Projects",
    "SystemSettings",
    "ExportSettings",
    "ExportInfo",
    "Paths",
    "IdMap",
    "Sites",
    "StudyTag",
    "ProjectDir",
    "FullName",
    "Description",
    "PrimaryContact",
    "DatmanProjectsDir",
    "DatmanAssetsDir",
    "ConfigDir",
    "Queue",
    "LogServer",
    "ServerLogDir",
    "XnatServer",
    "XnatPort",
    "XnatArchive",
    "XnatCredentials",
    "XnatSource",
    "XnatSourceArchive",
    "XnatSourceCredentials",
    "XnatConvention",
    "FtpServer",
    "FtpPort",
    "MrUser",
    "MrFolder",
    "MrFtpPass",
    "UsesRedcap",
    "RedcapApi",
    "RedcapToken",
    "UsesTechNotes",
    "KeepExtra",
    "Tasks",
];

/// True if `key` (or the first segment of a dotted key) is in the vocabulary
pub fn is_known_key(key: &str) -> bool {
    let top = key.split('.').next().unwrap_or(key);
    KNOWN_KEYS.contains(&top)
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs to a rolling file in addition to the console
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_log_path")]
    pub local_path: String,

    /// Rotation policy (daily, hourly, never)
    #[serde(default = "default_log_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid log rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("log path cannot be empty when file logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_log_path(),
            local_rotation: default_log_rotation(),
        }
    }
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

fn expect_map<'a>(
    value: &'a ConfigValue,
    name: &str,
    context: &StudyContext,
) -> Result<&'a ConfigMap> {
    value.as_map().ok_or_else(|| {
        DatmanError::config(
            format!("'{name}' must be a mapping, found {}", value.kind()),
            context,
        )
    })
}

fn expect_string_map(value: &ConfigValue, name: &str, context: &StudyContext) -> Result<()> {
    for (key, entry) in expect_map(value, name, context)? {
        if entry.as_str().is_none() {
            return Err(DatmanError::config(
                format!("'{name}.{key}' must be a string, found {}", entry.kind()),
                context,
            ));
        }
    }
    Ok(())
}

fn warn_unknown_keys(keys: impl Iterator<Item = String>, source: &str, context: &StudyContext) {
    for key in keys.filter(|k| !is_known_key(k)) {
        tracing::warn!(
            key = %key,
            source,
            study = ?context.study,
            site = ?context.site,
            "Unrecognised configuration key"
        );
    }
}

/// Validates the system document and returns the active deployment block
///
/// # Errors
///
/// Fails if `SystemSettings` is missing or empty, if `system` is not one of
/// its deployments, or if `Projects`, `Paths` or `ExportSettings` are
/// malformed.
pub fn validate_system<'a>(doc: &'a ConfigDocument, system: &str) -> Result<&'a ConfigMap> {
    let global = StudyContext::global();

    let settings = doc
        .get("SystemSettings")
        .ok_or_else(|| DatmanError::missing("SystemSettings", &global))?;
    let deployments = expect_map(settings, "SystemSettings", &global)?;
    if deployments.is_empty() {
        return Err(DatmanError::config(
            "'SystemSettings' must define at least one deployment",
            &global,
        ));
    }
    for (name, block) in deployments {
        expect_map(block, &format!("SystemSettings.{name}"), &global)?;
    }

    let active = deployments
        .get(system)
        .and_then(ConfigValue::as_map)
        .ok_or_else(|| {
            DatmanError::config(
                format!(
                    "system '{system}' is not defined in SystemSettings (available: {})",
                    deployments.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
                &global,
            )
        })?;

    if let Some(projects) = doc.get("Projects") {
        expect_string_map(projects, "Projects", &global)?;
    }
    if let Some(paths) = doc.get("Paths") {
        expect_string_map(paths, "Paths", &global)?;
    }
    if let Some(settings) = doc.get("ExportSettings") {
        parse_entries(expect_map(settings, "ExportSettings", &global)?, &global)?;
    }

    warn_unknown_keys(doc.keys().map(str::to_string), doc.source(), &global);
    warn_unknown_keys(active.keys().cloned(), doc.source(), &global);

    Ok(active)
}

/// Validates a study document against the system's `ExportSettings`
///
/// Checks `StudyTag`, the shape of `Sites`, every `ExportInfo` block (study
/// level and per site) and compiles every `IdMap` block.
pub fn validate_study(
    name: &str,
    doc: &ConfigDocument,
    export_settings: Option<&ConfigMap>,
) -> Result<String> {
    let context = StudyContext::study(name);

    let tag = doc
        .get("StudyTag")
        .ok_or_else(|| DatmanError::missing("StudyTag", &context))?
        .as_str()
        .ok_or_else(|| DatmanError::config("'StudyTag' must be a string", &context))?
        .to_string();

    validate_scope(doc.root(), export_settings, &context)?;

    if let Some(sites) = doc.get("Sites") {
        for (site, block) in expect_map(sites, "Sites", &context)? {
            let site_context = StudyContext::site(name, site.as_str());
            let block = expect_map(block, &format!("Sites.{site}"), &site_context)?;
            validate_scope(block, export_settings, &site_context)?;
            warn_unknown_keys(block.keys().cloned(), doc.source(), &site_context);
        }
    }

    warn_unknown_keys(doc.keys().map(str::to_string), doc.source(), &context);
    Ok(tag)
}

fn validate_scope(
    scope: &ConfigMap,
    export_settings: Option<&ConfigMap>,
    context: &StudyContext,
) -> Result<()> {
    if let Some(info) = scope.get("ExportInfo") {
        let entries = parse_entries(expect_map(info, "ExportInfo", context)?, context)?;
        if let Some(unknown) = entries
            .keys()
            .find(|tag| !export_settings.is_some_and(|defaults| defaults.contains_key(*tag)))
        {
            return Err(DatmanError::config(
                format!("ExportInfo references tag '{unknown}' which is not defined in ExportSettings"),
                context,
            ));
        }
    }
    if let Some(id_map) = scope.get("IdMap") {
        IdMapping::from_value(id_map, context.clone())?;
    }
    if let Some(paths) = scope.get("Paths") {
        expect_string_map(paths, "Paths", context)?;
    }
    Ok(())
}
