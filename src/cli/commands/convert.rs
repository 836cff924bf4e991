//! Convert command implementation
//!
//! Translates session identifiers between KCNI and Datman naming using the
//! owning study's `IdMap`.

use super::{exit_code, load_or_report, session_context};
use crate::cli::EXIT_OK;
use crate::config::ConfigResolver;
use crate::domain::Result;
use crate::ids::{Direction, IdConverter, IdScheme, ScanId};
use clap::Args;
use serde::Serialize;

/// Arguments for the convert command
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Identifiers to convert
    #[arg(required = true)]
    pub identifiers: Vec<String>,

    /// Target naming scheme (kcni or datman)
    #[arg(long)]
    pub to: IdScheme,

    /// Study whose IdMap applies (inferred from each identifier if omitted)
    ///
    /// The site is always inferred, so a site-level IdMap still applies.
    #[arg(long)]
    pub study: Option<String>,

    /// Check that each converted subject converts back to the original
    #[arg(long)]
    pub verify: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Conversion {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ConvertArgs {
    /// Execute the convert command
    pub async fn execute(&self, config_path: &str, system: &str) -> anyhow::Result<i32> {
        let resolver = match load_or_report(config_path, system) {
            Ok(r) => r,
            Err(code) => return Ok(code),
        };

        let direction = Direction::into_scheme(self.to);
        let mut exit = EXIT_OK;
        let mut conversions = Vec::with_capacity(self.identifiers.len());

        for identifier in &self.identifiers {
            match self.convert_one(&resolver, identifier, direction) {
                Ok(output) => conversions.push(Conversion {
                    input: identifier.clone(),
                    output: Some(output),
                    error: None,
                }),
                Err(e) => {
                    tracing::warn!(identifier = %identifier, direction = %direction, error = %e, "Conversion failed");
                    if exit == EXIT_OK {
                        exit = exit_code(&e);
                    }
                    conversions.push(Conversion {
                        input: identifier.clone(),
                        output: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&conversions)?);
        } else {
            for c in &conversions {
                match (&c.output, &c.error) {
                    (Some(output), _) => println!("{}\t{output}", c.input),
                    (None, Some(error)) => eprintln!("❌ {error}"),
                    (None, None) => {}
                }
            }
        }

        Ok(exit)
    }

    fn convert_one(&self, resolver: &ConfigResolver, identifier: &str, direction: Direction) -> Result<String> {
        let source = direction.source();
        let id = ScanId::parse(identifier, source)?;

        let (study, site) = session_context(resolver, self.study.as_deref(), &id, source)?;

        let mapping = resolver.id_mapping(Some(&study), site.as_deref())?;
        IdConverter::new(mapping)
            .with_round_trip_check(self.verify)
            .convert_str(identifier, direction)
    }
}
