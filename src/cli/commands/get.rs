//! Get command implementation
//!
//! Resolves one setting for a study and site and prints it with the level it
//! came from.

use super::{exit_code, load_or_report};
use crate::cli::EXIT_OK;
use crate::config::Resolved;
use clap::Args;

/// Arguments for the get command
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Setting name, optionally dotted (e.g. `Paths.nii`)
    pub key: String,

    /// Study (project name)
    #[arg(long)]
    pub study: Option<String>,

    /// Site tag within the study
    #[arg(long)]
    pub site: Option<String>,

    /// Fail if the setting is not defined at any level
    #[arg(long)]
    pub required: bool,

    /// Print the value and its origin as JSON
    #[arg(long)]
    pub json: bool,
}

impl GetArgs {
    /// Execute the get command
    pub async fn execute(&self, config_path: &str, system: &str) -> anyhow::Result<i32> {
        let resolver = match load_or_report(config_path, system) {
            Ok(r) => r,
            Err(code) => return Ok(code),
        };

        let study = self.study.as_deref();
        let site = self.site.as_deref();

        let resolved = if self.required {
            resolver.require(&self.key, study, site).map(Resolved::Found)
        } else {
            resolver.resolve(&self.key, study, site)
        };

        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                eprintln!("❌ {e}");
                return Ok(exit_code(&e));
            }
        };

        match (resolved, self.json) {
            (Resolved::Found(setting), true) => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "key": self.key,
                    "value": setting.value,
                    "origin": setting.origin,
                }))?
            ),
            (Resolved::Found(setting), false) => {
                println!("{}", setting.value);
                tracing::info!(key = %self.key, origin = %setting.origin, "Resolved setting");
            }
            (Resolved::Missing, true) => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "key": self.key,
                    "value": null,
                }))?
            ),
            (Resolved::Missing, false) => println!("(not set)"),
        }

        Ok(EXIT_OK)
    }
}
