//! Tags command implementation
//!
//! Prints the tag definitions in effect for a study and site, after
//! `ExportSettings` back-fill.

use super::{exit_code, load_or_report};
use crate::cli::EXIT_OK;
use clap::Args;

/// Arguments for the tags command
#[derive(Args, Debug)]
pub struct TagsArgs {
    /// Study (project name)
    #[arg(long)]
    pub study: Option<String>,

    /// Site tag within the study
    #[arg(long)]
    pub site: Option<String>,

    /// Include tags the context does not collect
    #[arg(long)]
    pub all: bool,

    /// Print definitions as JSON
    #[arg(long)]
    pub json: bool,
}

impl TagsArgs {
    /// Execute the tags command
    pub async fn execute(&self, config_path: &str, system: &str) -> anyhow::Result<i32> {
        let resolver = match load_or_report(config_path, system) {
            Ok(r) => r,
            Err(code) => return Ok(code),
        };

        let tags = match resolver.tags(self.study.as_deref(), self.site.as_deref()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("❌ {e}");
                return Ok(exit_code(&e));
            }
        };

        let shown: Vec<_> = tags.iter().filter(|def| self.all || def.active).collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&shown)?);
            return Ok(EXIT_OK);
        }

        println!(
            "{:<16} {:<8} {:<8} {:<6} {:<20} {}",
            "Tag", "Active", "Origin", "Count", "Formats", "SeriesDescription"
        );
        println!("{}", "-".repeat(90));
        for def in shown {
            println!(
                "{:<16} {:<8} {:<8} {:<6} {:<20} {}",
                def.name,
                if def.active { "yes" } else { "no" },
                def.origin.to_string(),
                def.count.map_or_else(|| "-".to_string(), |c| c.to_string()),
                def.formats.join(","),
                def.pattern
                    .as_ref()
                    .map(|p| p.series_description.join(" | "))
                    .unwrap_or_default()
            );
        }

        Ok(EXIT_OK)
    }
}
