//! Session identifier conversion between KCNI and Datman naming

use super::mapping::IdMapping;
use super::scheme::{Direction, ScanId};
use crate::domain::{DatmanError, Result};
use std::sync::Arc;

/// Converts identifiers using one study's compiled [`IdMapping`]
#[derive(Debug, Clone)]
pub struct IdConverter {
    mapping: Arc<IdMapping>,
    verify_round_trip: bool,
}

impl IdConverter {
    pub fn new(mapping: Arc<IdMapping>) -> Self {
        Self {
            mapping,
            verify_round_trip: false,
        }
    }

    /// Applies the reverse subject rule after every conversion and fails if
    /// it does not reproduce the input
    pub fn with_round_trip_check(mut self, enabled: bool) -> Self {
        self.verify_round_trip = enabled;
        self
    }

    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }

    /// Converts a subject field
    ///
    /// # Errors
    ///
    /// Returns [`DatmanError::UnconvertibleId`] if a subject rule is configured
    /// and `subject` does not match its extraction pattern.
    pub fn convert_subject(&self, subject: &str, direction: Direction) -> Result<String> {
        let Some(rule) = self.mapping.subject_rule(direction) else {
            return Ok(subject.to_string());
        };

        let converted = rule.apply(subject).ok_or_else(|| {
            self.unconvertible(
                subject,
                direction,
                format!("subject does not match '{}'", rule.pattern()),
            )
        })?;

        if self.verify_round_trip {
            let reverse = direction.reverse();
            let restored = self
                .mapping
                .subject_rule(reverse)
                .and_then(|rule| rule.apply(&converted));
            if restored.as_deref() != Some(subject) {
                return Err(self.unconvertible(
                    subject,
                    direction,
                    format!(
                        "'{converted}' does not convert back ({reverse}), got {}",
                        restored.as_deref().unwrap_or("no match")
                    ),
                ));
            }
        }

        Ok(converted)
    }

    /// Converts every field of a parsed identifier
    pub fn convert(&self, id: &ScanId, direction: Direction) -> Result<ScanId> {
        let subject = self.convert_subject(&id.subject, direction).map_err(|e| match e {
            DatmanError::UnconvertibleId {
                direction,
                reason,
                context,
                ..
            } => DatmanError::UnconvertibleId {
                identifier: id.to_string(),
                direction,
                reason,
                context,
            },
            other => other,
        })?;

        let converted = ScanId {
            study: self.mapping.map_study(&id.study, direction),
            site: self.mapping.map_site(&id.site, direction),
            subject,
            timepoint: id.timepoint.clone(),
            session: id.session.clone(),
        };

        tracing::debug!(
            from = %id,
            to = %converted,
            direction = %direction,
            "Converted session id"
        );

        Ok(converted)
    }

    /// Parses `identifier` in the direction's source scheme, converts it and
    /// formats it in the target scheme
    pub fn convert_str(&self, identifier: &str, direction: Direction) -> Result<String> {
        let id = ScanId::parse(identifier, direction.source())?;
        let converted = self.convert(&id, direction).map_err(|e| match e {
            DatmanError::UnconvertibleId {
                direction,
                reason,
                context,
                ..
            } => DatmanError::UnconvertibleId {
                identifier: identifier.to_string(),
                direction,
                reason,
                context,
            },
            other => other,
        })?;

        converted.format(direction.target()).map_err(|e| {
            self.unconvertible(identifier, direction, e.to_string())
        })
    }

    fn unconvertible(&self, identifier: &str, direction: Direction, reason: String) -> DatmanError {
        DatmanError::UnconvertibleId {
            identifier: identifier.to_string(),
            direction,
            reason,
            context: self.mapping.context().clone(),
        }
    }
}

/// Converts a full identifier string with `mapping`
pub fn convert(identifier: &str, mapping: &IdMapping, direction: Direction) -> Result<String> {
    IdConverter::new(Arc::new(mapping.clone())).convert_str(identifier, direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StudyContext;
    use crate::ids::mapping::SubjectRule;

    fn spins() -> IdMapping {
        IdMapping::empty(StudyContext::study("SPINS"))
            .with_study("SPN01", "SPINS")
            .with_site("UT1", "UT2")
            .with_subject_rules(
                SubjectRule::new(r"1P(\d+)", "ABCP${1}").unwrap(),
                SubjectRule::new(r"ABCP(\d+)", "1P${1}").unwrap(),
            )
    }

    #[test]
    fn test_convert_str_kcni_to_datman() {
        let out = convert("SPN01_UT1_1P00123_01_SE02_MR", &spins(), Direction::KcniToDatman).unwrap();
        assert_eq!(out, "SPINS_UT2_ABCP00123_01_02");
    }

    #[test]
    fn test_convert_str_datman_to_kcni() {
        let out = convert("SPINS_UT2_ABCP00123_01_02", &spins(), Direction::DatmanToKcni).unwrap();
        assert_eq!(out, "SPN01_UT1_1P00123_01_SE02_MR");
    }

    #[test]
    fn test_unmapped_fields_pass_through() {
        let mapping = IdMapping::empty(StudyContext::study("ASCEND"));
        let out = convert("ASC01_CMH_0042_01_SE01_MR", &mapping, Direction::KcniToDatman).unwrap();
        assert_eq!(out, "ASC01_CMH_0042_01_01");
    }

    #[test]
    fn test_subject_fails_closed() {
        let converter = IdConverter::new(Arc::new(spins()));
        let err = converter
            .convert_subject("ZZZ999", Direction::KcniToDatman)
            .unwrap_err();
        match err {
            DatmanError::UnconvertibleId {
                identifier,
                direction,
                context,
                ..
            } => {
                assert_eq!(identifier, "ZZZ999");
                assert_eq!(direction, Direction::KcniToDatman);
                assert_eq!(context, StudyContext::study("SPINS"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_whole_id_error_names_identifier() {
        let err = convert("SPN01_UT1_ZZZ999_01_SE02_MR", &spins(), Direction::KcniToDatman).unwrap_err();
        assert!(err.to_string().contains("'SPN01_UT1_ZZZ999_01_SE02_MR'"));
    }

    #[test]
    fn test_wrong_source_scheme() {
        let err = convert("SPINS_UT2_ABCP00123_01_02", &spins(), Direction::KcniToDatman).unwrap_err();
        assert!(matches!(err, DatmanError::InvalidId(_)));
    }

    #[test]
    fn test_round_trip_check_catches_lossy_rule() {
        let lossy = IdMapping::empty(StudyContext::study("LOSSY")).with_subject_rules(
            SubjectRule::new(r"0*(\d+)", "P${1}").unwrap(),
            SubjectRule::new(r"P(\d+)", "${1}").unwrap(),
        );
        let converter = IdConverter::new(Arc::new(lossy)).with_round_trip_check(true);
        assert!(converter.convert_subject("123", Direction::KcniToDatman).is_ok());
        assert!(converter.convert_subject("0123", Direction::KcniToDatman).is_err());
    }

    #[test]
    fn test_unformattable_result() {
        let mapping = IdMapping::empty(StudyContext::study("SPINS")).with_study("SPN01", "SPN_01");
        let err = convert("SPN01_CMH_0001_01_SE01_MR", &mapping, Direction::KcniToDatman).unwrap_err();
        assert!(matches!(err, DatmanError::UnconvertibleId { .. }));
    }
}
