//! Explicit `(study, site)` query context
//!
//! Every resolver, classifier and converter call names the study and site it
//! works for. There is no process-wide "current study".

use serde::Serialize;
use std::fmt;

/// The study and optional site a query or error refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct StudyContext {
    /// Project name as registered under `Projects`
    pub study: Option<String>,

    /// Site tag as declared under the study's `Sites`
    pub site: Option<String>,
}

impl StudyContext {
    /// Context for system-level queries
    pub fn global() -> Self {
        Self::default()
    }

    /// Context for a study without a site
    pub fn study(study: impl Into<String>) -> Self {
        Self {
            study: Some(study.into()),
            site: None,
        }
    }

    /// Context for a site within a study
    pub fn site(study: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            study: Some(study.into()),
            site: Some(site.into()),
        }
    }

    /// Builds a context from optional borrowed parts
    pub fn new(study: Option<&str>, site: Option<&str>) -> Self {
        Self {
            study: study.map(str::to_string),
            site: site.map(str::to_string),
        }
    }

    pub fn is_global(&self) -> bool {
        self.study.is_none() && self.site.is_none()
    }
}

/// Renders as ` (study 'X', site 'Y')`, or nothing for the global context,
/// so it can be appended directly to error messages.
impl fmt::Display for StudyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.study, &self.site) {
            (None, None) => Ok(()),
            (Some(study), None) => write!(f, " (study '{study}')"),
            (None, Some(site)) => write!(f, " (site '{site}')"),
            (Some(study), Some(site)) => write!(f, " (study '{study}', site '{site}')"),
        }
    }
}
