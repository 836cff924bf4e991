//! Series classification against resolved tag definitions

use super::counts::{count_matches, reconcile_counts, CountMismatch};
use super::series::SeriesRecord;
use crate::config::{TagDefinition, TagSet};
use crate::domain::{DatmanError, Result, StudyContext};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// One tag a series matched, with the patterns responsible
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagMatch {
    pub tag: String,

    /// The SeriesDescription pattern that matched
    pub pattern: String,

    /// The ImageType pattern that matched, if the tag constrains ImageType
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type_pattern: Option<String>,
}

/// Every tag a single series matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub series: SeriesRecord,
    pub matches: Vec<TagMatch>,

    /// More than one tag matched
    pub ambiguous: bool,

    /// One of the matched tags has a session count mismatch
    pub count_mismatch: bool,
}

impl ClassificationResult {
    /// Matched tag names, in tag name order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(|m| m.tag.as_str())
    }

    pub fn is_unmatched(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Classification of every series of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionClassification {
    pub context: StudyContext,
    pub results: Vec<ClassificationResult>,
    pub matches_per_tag: BTreeMap<String, usize>,
    pub mismatches: Vec<CountMismatch>,
}

impl SessionClassification {
    pub fn has_mismatches(&self) -> bool {
        !self.mismatches.is_empty()
    }

    pub fn ambiguous(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.results.iter().filter(|r| r.ambiguous)
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.results.iter().filter(|r| r.is_unmatched())
    }
}

#[derive(Debug)]
struct CompiledPatterns {
    sources: Vec<String>,
    regexes: Vec<Regex>,
}

impl CompiledPatterns {
    fn compile(tag: &str, sources: &[String], context: &StudyContext) -> Result<Self> {
        let regexes = sources
            .iter()
            .map(|source| {
                Regex::new(source).map_err(|e| DatmanError::Pattern {
                    tag: tag.to_string(),
                    pattern: source.clone(),
                    reason: e.to_string(),
                    context: context.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sources: sources.to_vec(),
            regexes,
        })
    }

    /// The first pattern found anywhere in `text`
    fn search(&self, text: &str) -> Option<&str> {
        self.regexes
            .iter()
            .position(|re| re.is_match(text))
            .map(|i| self.sources[i].as_str())
    }
}

#[derive(Debug)]
struct CompiledTag {
    name: String,
    series_description: CompiledPatterns,
    image_type: Option<CompiledPatterns>,
    echo_number: Option<u32>,
}

impl CompiledTag {
    fn compile(def: &TagDefinition, context: &StudyContext) -> Result<Option<Self>> {
        let Some(pattern) = &def.pattern else {
            return Ok(None);
        };
        Ok(Some(Self {
            name: def.name.clone(),
            series_description: CompiledPatterns::compile(&def.name, &pattern.series_description, context)?,
            image_type: pattern
                .image_type
                .as_deref()
                .map(|sources| CompiledPatterns::compile(&def.name, sources, context))
                .transpose()?,
            echo_number: pattern.echo_number,
        }))
    }

    fn matches(&self, series: &SeriesRecord) -> Option<TagMatch> {
        let pattern = self.series_description.search(&series.series_description)?;

        let image_type_pattern = match &self.image_type {
            Some(patterns) => Some(patterns.search(series.image_type.as_deref()?)?.to_string()),
            None => None,
        };

        if let Some(echo) = self.echo_number {
            if series.echo_number != Some(echo) {
                return None;
            }
        }

        Some(TagMatch {
            tag: self.name.clone(),
            pattern: pattern.to_string(),
            image_type_pattern,
        })
    }
}

/// Classifier compiled from the active tags of one `(study, site)` context
///
/// Immutable once built and safe to share between threads.
#[derive(Debug)]
pub struct ScanClassifier {
    context: StudyContext,
    tags: Vec<CompiledTag>,
    tag_set: TagSet,
}

impl ScanClassifier {
    /// Compiles every active tag's patterns, in tag name order
    ///
    /// # Errors
    ///
    /// Returns [`DatmanError::Pattern`] for the first pattern that does not
    /// compile. A broken pattern is never treated as one that never matches.
    pub fn new(tags: &TagSet) -> Result<Self> {
        let context = tags.context().clone();
        let mut compiled = Vec::new();
        for def in tags.active() {
            match CompiledTag::compile(def, &context)? {
                Some(tag) => compiled.push(tag),
                None => tracing::debug!(tag = %def.name, "Active tag has no pattern; skipping"),
            }
        }

        Ok(Self {
            context,
            tags: compiled,
            tag_set: tags.clone(),
        })
    }

    pub fn context(&self) -> &StudyContext {
        &self.context
    }

    /// Every tag whose constraints the series satisfies
    ///
    /// The SeriesDescription must match one of the tag's patterns. A declared
    /// ImageType constraint must also match, and a declared EchoNumber must be
    /// equal. All matching tags are reported.
    pub fn classify(&self, series: &SeriesRecord) -> ClassificationResult {
        let matches: Vec<TagMatch> = self.tags.iter().filter_map(|tag| tag.matches(series)).collect();

        ClassificationResult {
            series: series.clone(),
            ambiguous: matches.len() > 1,
            matches,
            count_mismatch: false,
        }
    }

    /// Classifies a whole session and reconciles per-tag counts
    pub fn classify_session(&self, series: &[SeriesRecord]) -> SessionClassification {
        let mut results: Vec<ClassificationResult> = series.iter().map(|s| self.classify(s)).collect();

        let matches_per_tag = count_matches(&results);
        let mismatches = reconcile_counts(&matches_per_tag, &self.tag_set);

        for mismatch in &mismatches {
            crate::log_count_mismatch!(mismatch, self.context);
        }
        for result in &mut results {
            let flagged = result
                .tags()
                .any(|tag| mismatches.iter().any(|m| m.tag == tag));
            result.count_mismatch = flagged;
        }

        let ambiguous = results.iter().filter(|r| r.ambiguous).count();
        if ambiguous > 0 {
            tracing::info!(
                study = ?self.context.study,
                site = ?self.context.site,
                ambiguous,
                "Series matched more than one tag"
            );
        }

        SessionClassification {
            context: self.context.clone(),
            results,
            matches_per_tag,
            mismatches,
        }
    }
}

/// Compiles `tags` and classifies one series
pub fn classify(series: &SeriesRecord, tags: &TagSet) -> Result<ClassificationResult> {
    Ok(ScanClassifier::new(tags)?.classify(series))
}
