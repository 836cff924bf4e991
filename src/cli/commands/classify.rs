//! Classify command implementation
//!
//! Each input file is a JSON array of series headers for one session, named
//! after the session identifier (e.g. `SPN01_CMH_0001_01_SE01_MR.json`).
//! Sessions are classified concurrently on blocking worker threads that share
//! one resolver.

use super::{exit_code, load_or_report, session_context};
use crate::classify::{ScanClassifier, SeriesRecord, SessionClassification};
use crate::cli::{EXIT_MISMATCH, EXIT_OK};
use crate::config::ConfigResolver;
use crate::domain::{DatmanError, Result, ResultExt};
use crate::ids::ScanId;
use chrono::{DateTime, Utc};
use clap::Args;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Arguments for the classify command
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Session files (JSON arrays of series headers)
    #[arg(required = true)]
    pub sessions: Vec<PathBuf>,

    /// Study for every session (inferred from file names if omitted)
    #[arg(long)]
    pub study: Option<String>,

    /// Site for every session (inferred from file names if omitted)
    #[arg(long, requires = "study")]
    pub site: Option<String>,

    /// Number of sessions classified concurrently
    #[arg(long, default_value_t = 4)]
    pub parallel: usize,

    /// Exit with code 3 if any session has a count mismatch
    #[arg(long)]
    pub strict: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Classification of one session file
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub session: String,
    pub file: PathBuf,
    #[serde(flatten)]
    pub classification: SessionClassification,
}

/// Outcome of a classify run
#[derive(Debug, Serialize)]
pub struct ClassifyReport {
    pub generated_at: DateTime<Utc>,
    pub system: String,
    pub duration_ms: u64,
    pub sessions: Vec<SessionReport>,
    pub failures: Vec<SessionFailure>,
}

/// A session file that could not be classified
#[derive(Debug, Serialize)]
pub struct SessionFailure {
    pub file: PathBuf,
    pub error: String,
}

impl ClassifyArgs {
    /// Execute the classify command
    pub async fn execute(&self, config_path: &str, system: &str) -> anyhow::Result<i32> {
        let resolver = match load_or_report(config_path, system) {
            Ok(r) => Arc::new(r),
            Err(code) => return Ok(code),
        };

        let started = Instant::now();
        let total = self.sessions.len();
        tracing::info!(sessions = total, parallel = self.parallel, "Classifying sessions");

        let study = self.study.clone();
        let site = self.site.clone();
        let outcomes: Vec<(PathBuf, Result<SessionReport>)> = stream::iter(self.sessions.iter().cloned())
            .map(|path| {
                let resolver = Arc::clone(&resolver);
                let study = study.clone();
                let site = site.clone();
                async move {
                    let file = path.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        classify_file(&resolver, &path, study.as_deref(), site.as_deref())
                    })
                    .await
                    .unwrap_or_else(|e| Err(DatmanError::Other(format!("classification task failed: {e}"))));
                    (file, outcome)
                }
            })
            .buffer_unordered(self.parallel.max(1))
            .collect()
            .await;

        let mut report = ClassifyReport {
            generated_at: Utc::now(),
            system: system.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            sessions: Vec::new(),
            failures: Vec::new(),
        };
        let mut exit = EXIT_OK;

        for (done, (file, outcome)) in outcomes.into_iter().enumerate() {
            crate::log_batch_progress!(done + 1, total);
            match outcome {
                Ok(session) => report.sessions.push(session),
                Err(e) => {
                    crate::log_error_with_context!(&e, "Failed to classify session");
                    if exit == EXIT_OK {
                        exit = exit_code(&e);
                    }
                    report.failures.push(SessionFailure {
                        file,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.sessions.sort_by(|a, b| a.session.cmp(&b.session));
        report.failures.sort_by(|a, b| a.file.cmp(&b.file));

        let mismatched = report
            .sessions
            .iter()
            .filter(|s| s.classification.has_mismatches())
            .count();
        tracing::info!(
            classified = report.sessions.len(),
            failed = report.failures.len(),
            mismatched,
            duration_ms = report.duration_ms,
            "Classification complete"
        );

        let json = serde_json::to_string_pretty(&report)?;
        match &self.output {
            Some(path) => std::fs::write(path, json)?,
            None => println!("{json}"),
        }

        if exit == EXIT_OK && self.strict && mismatched > 0 {
            exit = EXIT_MISMATCH;
        }
        Ok(exit)
    }
}

/// Reads and classifies one session file
pub fn classify_file(
    resolver: &ConfigResolver,
    path: &Path,
    study: Option<&str>,
    site: Option<&str>,
) -> Result<SessionReport> {
    let session = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| DatmanError::InvalidId(format!("no session name in {}", path.display())))?
        .to_string();

    let (study, site) = match study {
        Some(study) => (study.to_string(), site.map(str::to_string)),
        None => {
            let (scheme, id) = ScanId::detect(&session)?;
            session_context(resolver, None, &id, scheme)?
        }
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    let series: Vec<SeriesRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse session file {}", path.display()))?;

    let tags = resolver.tags(Some(&study), site.as_deref())?;
    let classifier = ScanClassifier::new(&tags)?;
    let classification = classifier.classify_session(&series);

    tracing::debug!(
        session = %session,
        study = %study,
        site = ?site,
        series = series.len(),
        "Classified session"
    );

    Ok(SessionReport {
        session,
        file: path.to_path_buf(),
        classification,
    })
}
