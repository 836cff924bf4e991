//! Tag definitions derived from `ExportSettings` and `ExportInfo`
//!
//! The global `ExportSettings` block declares every tag a deployment knows
//! about together with its default export attributes. Studies and sites list
//! the tags they collect under `ExportInfo`, usually supplying only a
//! `Pattern` and a `Count`. Each field missing from an `ExportInfo` entry is
//! back-filled from the `ExportSettings` entry of the same name. This is the
//! only place configuration is merged field by field; a field that is set
//! (including `Pattern`) replaces the default in full.

use super::document::Origin;
use super::value::{ConfigMap, ConfigValue};
use crate::domain::{DatmanError, Result, StudyContext};
use serde::Serialize;
use std::collections::BTreeMap;

/// Header constraints a series must satisfy to receive a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPattern {
    /// Regex searches against SeriesDescription; any one matching is enough
    pub series_description: Vec<String>,

    /// Regex searches against ImageType; if declared, one must also match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<Vec<String>>,

    /// Required EchoNumber, compared exactly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo_number: Option<u32>,
}

impl SeriesPattern {
    pub fn new<I, S>(series_description: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            series_description: series_description.into_iter().map(Into::into).collect(),
            image_type: None,
            echo_number: None,
        }
    }

    pub fn with_image_type<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_type = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_echo_number(mut self, echo: u32) -> Self {
        self.echo_number = Some(echo);
        self
    }
}

/// A fully resolved tag for one `(study, site)` context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagDefinition {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<SeriesPattern>,

    /// Number of matching series expected per session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    pub formats: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc_pha: Option<String>,

    /// Whether the context's `ExportInfo` collects this tag
    pub active: bool,

    /// Level the `ExportInfo` entry came from (`System` for default-only tags)
    pub origin: Origin,
}

impl TagDefinition {
    /// An active tag matched by the given pattern
    pub fn new(name: impl Into<String>, pattern: SeriesPattern) -> Self {
        Self {
            name: name.into(),
            pattern: Some(pattern),
            count: None,
            formats: Vec::new(),
            qc_type: None,
            qc_pha: None,
            active: true,
            origin: Origin::Site,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_qc_type(mut self, qc_type: impl Into<String>) -> Self {
        self.qc_type = Some(qc_type.into());
        self
    }
}

/// Fields of a single tag entry exactly as written; `None` means "not set"
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TagFields {
    pattern: Option<SeriesPattern>,
    count: Option<u32>,
    formats: Option<Vec<String>>,
    qc_type: Option<String>,
    qc_pha: Option<String>,
}

impl TagFields {
    /// Parses and type-checks one `ExportSettings`/`ExportInfo` entry
    pub(crate) fn parse(tag: &str, value: &ConfigValue, context: &StudyContext) -> Result<Self> {
        let entry = value.as_map().ok_or_else(|| {
            DatmanError::config(
                format!("tag '{tag}' must be a mapping, found {}", value.kind()),
                context,
            )
        })?;

        let mut fields = TagFields::default();
        for (field, value) in entry {
            match field.as_str() {
                "Pattern" => fields.pattern = Some(parse_pattern(tag, value, context)?),
                "Count" => fields.count = Some(parse_count(tag, "Count", value, context)?),
                "Formats" => {
                    fields.formats = Some(value.string_list().ok_or_else(|| {
                        type_error(tag, "Formats", "a string or list of strings", value, context)
                    })?)
                }
                "QcType" => fields.qc_type = Some(parse_string(tag, "QcType", value, context)?),
                "QcPha" => fields.qc_pha = Some(parse_string(tag, "QcPha", value, context)?),
                other => {
                    tracing::debug!(tag, field = other, "Ignoring unrecognised tag field");
                }
            }
        }
        Ok(fields)
    }

    /// Takes each unset field from `defaults`
    fn backfill(self, defaults: &TagFields) -> TagFields {
        TagFields {
            pattern: self.pattern.or_else(|| defaults.pattern.clone()),
            count: self.count.or(defaults.count),
            formats: self.formats.or_else(|| defaults.formats.clone()),
            qc_type: self.qc_type.or_else(|| defaults.qc_type.clone()),
            qc_pha: self.qc_pha.or_else(|| defaults.qc_pha.clone()),
        }
    }

    fn into_definition(self, name: &str, active: bool, origin: Origin) -> TagDefinition {
        TagDefinition {
            name: name.to_string(),
            pattern: self.pattern,
            count: self.count,
            formats: self.formats.unwrap_or_default(),
            qc_type: self.qc_type,
            qc_pha: self.qc_pha,
            active,
            origin,
        }
    }
}

fn type_error(
    tag: &str,
    field: &str,
    expected: &str,
    value: &ConfigValue,
    context: &StudyContext,
) -> DatmanError {
    DatmanError::config(
        format!(
            "tag '{tag}' field '{field}' must be {expected}, found {}",
            value.kind()
        ),
        context,
    )
}

fn parse_string(tag: &str, field: &str, value: &ConfigValue, context: &StudyContext) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| type_error(tag, field, "a string", value, context))
}

fn parse_count(tag: &str, field: &str, value: &ConfigValue, context: &StudyContext) -> Result<u32> {
    value
        .as_integer()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| type_error(tag, field, "a non-negative integer", value, context))
}

fn parse_pattern(tag: &str, value: &ConfigValue, context: &StudyContext) -> Result<SeriesPattern> {
    let pattern = value
        .as_map()
        .ok_or_else(|| type_error(tag, "Pattern", "a mapping", value, context))?;

    let series_description = match pattern.get("SeriesDescription") {
        Some(v) => v
            .string_list()
            .filter(|list| !list.is_empty())
            .ok_or_else(|| {
                type_error(
                    tag,
                    "Pattern.SeriesDescription",
                    "a string or non-empty list of strings",
                    v,
                    context,
                )
            })?,
        None => {
            return Err(DatmanError::config(
                format!("tag '{tag}' Pattern has no SeriesDescription"),
                context,
            ))
        }
    };

    let image_type = pattern
        .get("ImageType")
        .map(|v| {
            v.string_list().filter(|list| !list.is_empty()).ok_or_else(|| {
                type_error(
                    tag,
                    "Pattern.ImageType",
                    "a string or non-empty list of strings",
                    v,
                    context,
                )
            })
        })
        .transpose()?;

    let echo_number = pattern
        .get("EchoNumber")
        .map(|v| parse_count(tag, "Pattern.EchoNumber", v, context))
        .transpose()?;

    Ok(SeriesPattern {
        series_description,
        image_type,
        echo_number,
    })
}

/// Parses every entry of an `ExportSettings`/`ExportInfo` mapping
pub(crate) fn parse_entries(
    entries: &ConfigMap,
    context: &StudyContext,
) -> Result<BTreeMap<String, TagFields>> {
    entries
        .iter()
        .map(|(tag, value)| Ok((tag.clone(), TagFields::parse(tag, value, context)?)))
        .collect()
}

/// The resolved tags for one `(study, site)` context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSet {
    context: StudyContext,
    tags: BTreeMap<String, TagDefinition>,
}

impl TagSet {
    /// Merges the global defaults with the effective `ExportInfo`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `ExportInfo` names a tag missing from
    /// `ExportSettings`, if any entry is malformed, or if a collected tag has
    /// no `Pattern` after back-fill.
    pub fn build(
        context: StudyContext,
        export_settings: Option<&ConfigMap>,
        export_info: Option<(&ConfigMap, Origin)>,
    ) -> Result<Self> {
        let empty = ConfigMap::new();
        let defaults = parse_entries(export_settings.unwrap_or(&empty), &context)?;

        let (overrides, origin) = match export_info {
            Some((entries, origin)) => (parse_entries(entries, &context)?, origin),
            None => (BTreeMap::new(), Origin::System),
        };

        if let Some(unknown) = overrides.keys().find(|tag| !defaults.contains_key(*tag)) {
            return Err(DatmanError::config(
                format!("ExportInfo references tag '{unknown}' which is not defined in ExportSettings"),
                &context,
            ));
        }

        let mut tags = BTreeMap::new();
        for (name, default) in &defaults {
            let definition = match overrides.get(name) {
                Some(fields) => {
                    let merged = fields.clone().backfill(default);
                    if merged.pattern.is_none() {
                        return Err(DatmanError::config(
                            format!("tag '{name}' is collected but has no Pattern"),
                            &context,
                        ));
                    }
                    merged.into_definition(name, true, origin)
                }
                None => default.clone().into_definition(name, false, Origin::System),
            };
            tags.insert(name.clone(), definition);
        }

        tracing::debug!(
            study = ?context.study,
            site = ?context.site,
            total = tags.len(),
            active = overrides.len(),
            "Resolved tag definitions"
        );

        Ok(Self { context, tags })
    }

    /// Builds a set directly from definitions
    pub fn from_definitions<I>(context: StudyContext, definitions: I) -> Self
    where
        I: IntoIterator<Item = TagDefinition>,
    {
        Self {
            context,
            tags: definitions
                .into_iter()
                .map(|def| (def.name.clone(), def))
                .collect(),
        }
    }

    pub fn context(&self) -> &StudyContext {
        &self.context
    }

    pub fn get(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// All tags, in name order
    pub fn iter(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.values()
    }

    /// Tags collected in this context, in name order
    pub fn active(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.values().filter(|def| def.active)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
