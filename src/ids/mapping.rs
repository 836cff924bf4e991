//! Per-study identifier mapping rules (`IdMap`)
//!
//! An `IdMap` block lists only the fields that differ between the KCNI and
//! Datman conventions:
//!
//! ```toml
//! [IdMap.Study]
//! SPN01 = "SPINS"
//!
//! [IdMap.Site]
//! UT1 = "UT2"
//!
//! [IdMap.Subject.KcniToDatman]
//! Pattern = '1P(\d+)'
//! Template = 'ABCP${1}'
//!
//! [IdMap.Subject]
//! DatmanToKcni = 'ABCP(\d+)->1P\1'
//! ```
//!
//! `Study` and `Site` map KCNI values to Datman values. Subject rules are an
//! extraction pattern plus a reconstruction template per direction, written
//! either as a `{Pattern, Template}` table or as a single `pattern->template`
//! string. Both directions must be given and both must compile.

use super::scheme::Direction;
use crate::config::value::ConfigValue;
use crate::domain::{DatmanError, Result, StudyContext};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn template_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:\$|\{([^}]*)\}|([0-9A-Za-z_]+))").expect("reference pattern is valid")
    })
}

fn python_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\(?:([0-9]+)|g<([0-9A-Za-z_]+)>)").expect("reference pattern is valid")
    })
}

/// Rewrites `\1` and `\g<name>` back-references into `${1}` and `${name}`
fn normalize_template(template: &str) -> String {
    python_reference_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let group = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            format!("${{{group}}}")
        })
        .into_owned()
}

/// One direction of a subject translation
#[derive(Debug, Clone)]
pub struct SubjectRule {
    pattern: String,
    template: String,
    regex: Regex,
}

impl SubjectRule {
    /// Compiles an extraction pattern and checks the template against it
    ///
    /// The pattern must match the whole subject field. Every back-reference in
    /// the template must name a capture group of the pattern.
    pub fn new(pattern: &str, template: &str) -> std::result::Result<Self, String> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| format!("pattern '{pattern}' does not compile: {e}"))?;
        let template = normalize_template(template);

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        for caps in template_reference_regex().captures_iter(&template) {
            let Some(group) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                continue;
            };
            let valid = match group.parse::<usize>() {
                Ok(index) => index < regex.captures_len(),
                Err(_) => names.contains(&group),
            };
            if !valid {
                return Err(format!(
                    "template '{template}' refers to group '{group}' which pattern '{pattern}' does not capture"
                ));
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            template,
            regex,
        })
    }

    /// Parses the single-string `pattern->template` form
    pub fn parse_legacy(rule: &str) -> std::result::Result<Self, String> {
        let (pattern, template) = rule
            .split_once("->")
            .ok_or_else(|| format!("rule '{rule}' is not of the form 'pattern->template'"))?;
        Self::new(pattern, template)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Rebuilds `subject` through the template, or `None` if the pattern does
    /// not match the whole subject
    pub fn apply(&self, subject: &str) -> Option<String> {
        let caps = self.regex.captures(subject)?;
        let mut out = String::new();
        caps.expand(&self.template, &mut out);
        Some(out)
    }
}

/// Paired subject rules, one per direction
#[derive(Debug, Clone)]
pub struct SubjectRules {
    pub kcni_to_datman: SubjectRule,
    pub datman_to_kcni: SubjectRule,
}

impl SubjectRules {
    pub fn get(&self, direction: Direction) -> &SubjectRule {
        match direction {
            Direction::KcniToDatman => &self.kcni_to_datman,
            Direction::DatmanToKcni => &self.datman_to_kcni,
        }
    }
}

/// Compiled identifier mapping for one `(study, site)` context
#[derive(Debug, Clone)]
pub struct IdMapping {
    context: StudyContext,
    study: BTreeMap<String, String>,
    site: BTreeMap<String, String>,
    subject: Option<SubjectRules>,
}

impl IdMapping {
    /// A mapping under which every field passes through unchanged
    pub fn empty(context: StudyContext) -> Self {
        Self {
            context,
            study: BTreeMap::new(),
            site: BTreeMap::new(),
            subject: None,
        }
    }

    /// Compiles an `IdMap` configuration value
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown fields, non-invertible
    /// `Study`/`Site` maps, subject rules declared for only one direction,
    /// rules that do not compile, and templates referring to missing groups.
    pub fn from_value(value: &ConfigValue, context: StudyContext) -> Result<Self> {
        let block = value
            .as_map()
            .ok_or_else(|| DatmanError::config("'IdMap' must be a mapping", &context))?;

        let mut mapping = Self::empty(context);
        for (field, value) in block {
            match field.as_str() {
                "Study" => mapping.study = literal_map(value, "IdMap.Study", &mapping.context)?,
                "Site" => mapping.site = literal_map(value, "IdMap.Site", &mapping.context)?,
                "Subject" => mapping.subject = Some(subject_rules(value, &mapping.context)?),
                other => {
                    return Err(DatmanError::config(
                        format!("unknown IdMap field '{other}' (expected Study, Site or Subject)"),
                        &mapping.context,
                    ))
                }
            }
        }
        Ok(mapping)
    }

    pub fn with_study(mut self, kcni: impl Into<String>, datman: impl Into<String>) -> Self {
        self.study.insert(kcni.into(), datman.into());
        self
    }

    pub fn with_site(mut self, kcni: impl Into<String>, datman: impl Into<String>) -> Self {
        self.site.insert(kcni.into(), datman.into());
        self
    }

    pub fn with_subject_rules(mut self, kcni_to_datman: SubjectRule, datman_to_kcni: SubjectRule) -> Self {
        self.subject = Some(SubjectRules {
            kcni_to_datman,
            datman_to_kcni,
        });
        self
    }

    pub fn context(&self) -> &StudyContext {
        &self.context
    }

    /// Translates a study code; unmapped codes pass through
    pub fn map_study(&self, value: &str, direction: Direction) -> String {
        map_literal(&self.study, value, direction)
    }

    /// Translates a site code; unmapped codes pass through
    pub fn map_site(&self, value: &str, direction: Direction) -> String {
        map_literal(&self.site, value, direction)
    }

    /// The subject rule for a direction, if subject rules are configured
    pub fn subject_rule(&self, direction: Direction) -> Option<&SubjectRule> {
        self.subject.as_ref().map(|rules| rules.get(direction))
    }

    pub fn has_subject_rules(&self) -> bool {
        self.subject.is_some()
    }
}

fn map_literal(map: &BTreeMap<String, String>, value: &str, direction: Direction) -> String {
    let mapped = match direction {
        Direction::KcniToDatman => map.get(value),
        Direction::DatmanToKcni => map
            .iter()
            .find(|(_, datman)| datman.as_str() == value)
            .map(|(kcni, _)| kcni),
    };
    mapped.map_or_else(|| value.to_string(), Clone::clone)
}

fn literal_map(value: &ConfigValue, name: &str, context: &StudyContext) -> Result<BTreeMap<String, String>> {
    let entries = value
        .as_map()
        .ok_or_else(|| DatmanError::config(format!("'{name}' must be a mapping"), context))?;

    let mut map = BTreeMap::new();
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (from, to) in entries {
        let to = to.as_str().ok_or_else(|| {
            DatmanError::config(
                format!("'{name}.{from}' must be a string, found {}", to.kind()),
                context,
            )
        })?;
        if let Some(previous) = seen.insert(to, from) {
            return Err(DatmanError::config(
                format!("'{name}' maps both '{previous}' and '{from}' to '{to}', so it cannot be reversed"),
                context,
            ));
        }
        map.insert(from.clone(), to.to_string());
    }
    Ok(map)
}

fn subject_rules(value: &ConfigValue, context: &StudyContext) -> Result<SubjectRules> {
    let entries = value
        .as_map()
        .ok_or_else(|| DatmanError::config("'IdMap.Subject' must be a mapping", context))?;

    let invalid = |message: String| DatmanError::config(format!("IdMap.Subject: {message}"), context);

    // Legacy form: a single `kcni_rule = datman_rule` entry.
    if entries.len() == 1 && !entries.contains_key("KcniToDatman") && !entries.contains_key("DatmanToKcni") {
        if let Some((forward, ConfigValue::String(backward))) = entries.iter().next() {
            return Ok(SubjectRules {
                kcni_to_datman: SubjectRule::parse_legacy(forward).map_err(invalid)?,
                datman_to_kcni: SubjectRule::parse_legacy(backward).map_err(invalid)?,
            });
        }
    }

    if let Some(other) = entries
        .keys()
        .find(|key| !matches!(key.as_str(), "KcniToDatman" | "DatmanToKcni"))
    {
        return Err(invalid(format!(
            "unknown direction '{other}' (expected KcniToDatman and DatmanToKcni)"
        )));
    }

    let rule = |direction: &str| -> Result<SubjectRule> {
        let value = entries.get(direction).ok_or_else(|| {
            invalid(format!(
                "a rule for {direction} is required when subject rules are declared"
            ))
        })?;
        parse_rule(value).map_err(|e| invalid(format!("{direction}: {e}")))
    };

    Ok(SubjectRules {
        kcni_to_datman: rule("KcniToDatman")?,
        datman_to_kcni: rule("DatmanToKcni")?,
    })
}

fn parse_rule(value: &ConfigValue) -> std::result::Result<SubjectRule, String> {
    match value {
        ConfigValue::String(rule) => SubjectRule::parse_legacy(rule),
        ConfigValue::Map(fields) => {
            let field = |name: &str| -> std::result::Result<&str, String> {
                fields
                    .get(name)
                    .and_then(ConfigValue::as_str)
                    .ok_or_else(|| format!("'{name}' must be a string"))
            };
            SubjectRule::new(field("Pattern")?, field("Template")?)
        }
        other => Err(format!(
            "a rule must be a string or a mapping, found {}",
            other.kind()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_map(text: &str) -> Result<IdMapping> {
        let table: toml::Table = toml::from_str(text).unwrap();
        let value = ConfigValue::from(toml::Value::Table(table));
        IdMapping::from_value(
            value.get("IdMap").unwrap(),
            StudyContext::study("SPINS"),
        )
    }

    #[test]
    fn test_normalize_python_references() {
        assert_eq!(normalize_template(r"ABCP\1"), "ABCP${1}");
        assert_eq!(normalize_template(r"\g<num>X"), "${num}X");
        assert_eq!(normalize_template("ABCP${1}"), "ABCP${1}");
    }

    #[test]
    fn test_rule_apply_is_anchored() {
        let rule = SubjectRule::new(r"1P(\d+)", "ABCP${1}").unwrap();
        assert_eq!(rule.apply("1P00123").as_deref(), Some("ABCP00123"));
        assert_eq!(rule.apply("X1P00123"), None);
        assert_eq!(rule.apply("1P00123X"), None);
    }

    #[test]
    fn test_rule_rejects_unknown_group() {
        let err = SubjectRule::new(r"1P(\d+)", "ABCP${2}").unwrap_err();
        assert!(err.contains("group '2'"));

        let err = SubjectRule::new(r"1P(?P<num>\d+)", "ABCP${nmu}").unwrap_err();
        assert!(err.contains("group 'nmu'"));

        assert!(SubjectRule::new(r"1P(?P<num>\d+)", "ABCP${num}").is_ok());
    }

    #[test]
    fn test_rule_rejects_bad_pattern() {
        assert!(SubjectRule::new(r"1P(\d+", "x").is_err());
    }

    #[test]
    fn test_legacy_rule() {
        let rule = SubjectRule::parse_legacy(r"ABCP(\d+)->1P\1").unwrap();
        assert_eq!(rule.pattern(), r"ABCP(\d+)");
        assert_eq!(rule.template(), "1P${1}");
        assert!(SubjectRule::parse_legacy("no arrow").is_err());
    }

    #[test]
    fn test_structured_config() {
        let mapping = id_map(
            r#"
            [IdMap.Study]
            SPN01 = "SPINS"
            [IdMap.Subject.KcniToDatman]
            Pattern = '1P(\d+)'
            Template = 'ABCP${1}'
            [IdMap.Subject]
            DatmanToKcni = 'ABCP(\d+)->1P\1'
            "#,
        )
        .unwrap();

        assert_eq!(mapping.map_study("SPN01", Direction::KcniToDatman), "SPINS");
        assert_eq!(mapping.map_study("SPINS", Direction::DatmanToKcni), "SPN01");
        assert_eq!(mapping.map_site("CMH", Direction::KcniToDatman), "CMH");
        assert!(mapping.has_subject_rules());
    }

    #[test]
    fn test_legacy_single_entry_config() {
        let mapping = id_map(
            r#"
            [IdMap.Subject]
            '1P(\d+)->ABCP\1' = 'ABCP(\d+)->1P\1'
            "#,
        )
        .unwrap();
        let rule = mapping.subject_rule(Direction::KcniToDatman).unwrap();
        assert_eq!(rule.apply("1P007").as_deref(), Some("ABCP007"));
    }

    #[test]
    fn test_one_direction_rejected() {
        let err = id_map(
            r#"
            [IdMap.Subject]
            KcniToDatman = '1P(\d+)->ABCP\1'
            "#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("DatmanToKcni"));
        assert!(msg.contains("study 'SPINS'"));
    }

    #[test]
    fn test_non_invertible_site_map_rejected() {
        let err = id_map(
            r#"
            [IdMap.Site]
            UT1 = "UTO"
            UT2 = "UTO"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be reversed"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(id_map("[IdMap.Session]\nA = \"B\"").is_err());
    }
}
