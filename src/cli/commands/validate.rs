//! Validate config command implementation
//!
//! Loads the system document and every registered study document, then
//! builds the tag definitions, classifier and id mapping of every study and
//! site so that broken patterns and rules surface before any data is touched.

use super::{exit_code, load_or_report};
use crate::classify::ScanClassifier;
use crate::cli::EXIT_OK;
use crate::config::ConfigResolver;
use crate::domain::Result;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str, system: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, system = %system, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path} (system '{system}')");
        println!();

        let resolver = match load_or_report(config_path, system) {
            Ok(r) => {
                println!("✅ Configuration documents loaded successfully");
                r
            }
            Err(code) => return Ok(code),
        };

        let mut failures = Vec::new();
        for study in resolver.projects() {
            let mut contexts = vec![None];
            contexts.extend(resolver.sites(study)?.into_iter().map(Some));
            for site in contexts {
                if let Err(e) = check_context(&resolver, study, site) {
                    failures.push(e);
                }
            }
        }

        if let Some(first) = failures.first() {
            println!("❌ Configuration validation failed");
            for e in &failures {
                println!("   Error: {e}");
            }
            println!();
            return Ok(exit_code(first));
        }

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  System: {}", resolver.system_name());
        println!("  Source: {}", resolver.system_document().source());
        for study in resolver.projects() {
            let sites = resolver.sites(study)?;
            println!(
                "  {study} (StudyTag {}): {}",
                resolver.study_tag(study)?,
                if sites.is_empty() {
                    "no sites declared".to_string()
                } else {
                    sites.join(", ")
                }
            );
        }
        println!();
        Ok(EXIT_OK)
    }
}

fn check_context(resolver: &ConfigResolver, study: &str, site: Option<&str>) -> Result<()> {
    let tags = resolver.tags(Some(study), site)?;
    ScanClassifier::new(&tags)?;
    resolver.id_mapping(Some(study), site)?;
    tracing::debug!(study, site = ?site, active = tags.active().count(), "Context is valid");
    Ok(())
}
