//! Session identifiers and the two naming schemes they are written in
//!
//! - **KCNI** (scheme A): `SPN01_CMH_0001_01_SE01_MR`
//! - **Datman** (scheme B): `SPINS_CMH_0001_01_01`
//!
//! Both carry the same five fields; only the spelling and the values of the
//! study, site and subject fields differ between conventions.

use crate::domain::{DatmanError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const KCNI_PATTERN: &str = r"^(?P<study>[A-Z]{3}[0-9]{2})_(?P<site>[A-Z0-9]{3})_(?P<subject>[A-Za-z0-9]+)_(?P<timepoint>[0-9]{2})_SE(?P<session>[0-9]{2})_MR$";

const DATMAN_PATTERN: &str =
    r"^(?P<study>[^_\s]+)_(?P<site>[^_\s]+)_(?P<subject>[^_\s]+)_(?P<timepoint>[^_\s]+)_(?P<session>[0-9]{2})$";

fn kcni_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(KCNI_PATTERN).expect("KCNI id pattern is valid"))
}

fn datman_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DATMAN_PATTERN).expect("Datman id pattern is valid"))
}

/// Identifier naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Scanner-side convention (scheme A)
    Kcni,
    /// Archive-side convention (scheme B)
    Datman,
}

impl IdScheme {
    fn regex(self) -> &'static Regex {
        match self {
            IdScheme::Kcni => kcni_regex(),
            IdScheme::Datman => datman_regex(),
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdScheme::Kcni => write!(f, "KCNI"),
            IdScheme::Datman => write!(f, "Datman"),
        }
    }
}

impl FromStr for IdScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kcni" => Ok(IdScheme::Kcni),
            "datman" => Ok(IdScheme::Datman),
            _ => Err(format!(
                "Invalid naming scheme '{s}'. Must be one of: kcni, datman"
            )),
        }
    }
}

/// Conversion direction between the two schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Scheme A to scheme B
    KcniToDatman,
    /// Scheme B to scheme A
    DatmanToKcni,
}

impl Direction {
    /// The direction that converts into `target`
    pub fn into_scheme(target: IdScheme) -> Self {
        match target {
            IdScheme::Datman => Direction::KcniToDatman,
            IdScheme::Kcni => Direction::DatmanToKcni,
        }
    }

    pub fn source(self) -> IdScheme {
        match self {
            Direction::KcniToDatman => IdScheme::Kcni,
            Direction::DatmanToKcni => IdScheme::Datman,
        }
    }

    pub fn target(self) -> IdScheme {
        match self {
            Direction::KcniToDatman => IdScheme::Datman,
            Direction::DatmanToKcni => IdScheme::Kcni,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::KcniToDatman => Direction::DatmanToKcni,
            Direction::DatmanToKcni => Direction::KcniToDatman,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source(), self.target())
    }
}

/// A parsed session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId {
    pub study: String,
    pub site: String,
    pub subject: String,
    pub timepoint: String,
    pub session: String,
}

impl ScanId {
    /// Parses an identifier written in `scheme`
    ///
    /// # Errors
    ///
    /// Returns [`DatmanError::InvalidId`] if the string does not follow the
    /// scheme's format.
    pub fn parse(identifier: &str, scheme: IdScheme) -> Result<Self> {
        let caps = scheme.regex().captures(identifier).ok_or_else(|| {
            DatmanError::InvalidId(format!("'{identifier}' is not a valid {scheme} session id"))
        })?;

        Ok(Self {
            study: caps["study"].to_string(),
            site: caps["site"].to_string(),
            subject: caps["subject"].to_string(),
            timepoint: caps["timepoint"].to_string(),
            session: caps["session"].to_string(),
        })
    }

    /// Parses an identifier in whichever scheme it matches, KCNI first
    pub fn detect(identifier: &str) -> Result<(IdScheme, Self)> {
        [IdScheme::Kcni, IdScheme::Datman]
            .into_iter()
            .find_map(|scheme| Self::parse(identifier, scheme).ok().map(|id| (scheme, id)))
            .ok_or_else(|| {
                DatmanError::InvalidId(format!(
                    "'{identifier}' is neither a KCNI nor a Datman session id"
                ))
            })
    }

    /// Writes the identifier in `scheme`
    ///
    /// # Errors
    ///
    /// Fails if the fields cannot be spelled in that scheme (for example a
    /// study code that is not three letters and two digits in KCNI).
    pub fn format(&self, scheme: IdScheme) -> Result<String> {
        let rendered = match scheme {
            IdScheme::Kcni => format!(
                "{}_{}_{}_{}_SE{}_MR",
                self.study, self.site, self.subject, self.timepoint, self.session
            ),
            IdScheme::Datman => format!(
                "{}_{}_{}_{}_{}",
                self.study, self.site, self.subject, self.timepoint, self.session
            ),
        };

        match Self::parse(&rendered, scheme) {
            Ok(parsed) if parsed == *self => Ok(rendered),
            _ => Err(DatmanError::InvalidId(format!(
                "fields of '{self}' cannot form a valid {scheme} session id"
            ))),
        }
    }
}

/// Renders the fields joined by `_`, independent of scheme
impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.study, self.site, self.subject, self.timepoint, self.session
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_kcni() {
        let id = ScanId::parse("SPN01_CMH_1P00123_01_SE02_MR", IdScheme::Kcni).unwrap();
        assert_eq!(id.study, "SPN01");
        assert_eq!(id.site, "CMH");
        assert_eq!(id.subject, "1P00123");
        assert_eq!(id.timepoint, "01");
        assert_eq!(id.session, "02");
    }

    #[test]
    fn test_parse_kcni_site_with_digit() {
        let id = ScanId::parse("SPN01_UT1_1P00123_01_SE02_MR", IdScheme::Kcni).unwrap();
        assert_eq!(id.site, "UT1");
        assert_eq!(id.format(IdScheme::Kcni).unwrap(), "SPN01_UT1_1P00123_01_SE02_MR");
    }

    #[test]
    fn test_parse_datman() {
        let id = ScanId::parse("SPINS_CMH_ABCP00123_01_02", IdScheme::Datman).unwrap();
        assert_eq!(id.study, "SPINS");
        assert_eq!(id.subject, "ABCP00123");
        assert_eq!(id.session, "02");
    }

    #[test_case("SPN01_CMH_0001_01_SE01", IdScheme::Kcni ; "kcni missing suffix")]
    #[test_case("SPINS01_CMH_0001_01_SE01_MR", IdScheme::Kcni ; "kcni long study")]
    #[test_case("SPINS_CMH_0001_01", IdScheme::Datman ; "datman missing session")]
    #[test_case("SPINS_CMH_0001_01_1", IdScheme::Datman ; "datman short session")]
    #[test_case("SPN01_cmh_0001_01_SE01_MR", IdScheme::Kcni ; "kcni lowercase site")]
    #[test_case("SPN01_CMHX_0001_01_SE01_MR", IdScheme::Kcni ; "kcni long site")]
    #[test_case("", IdScheme::Datman ; "empty")]
    fn test_parse_rejects(identifier: &str, scheme: IdScheme) {
        assert!(matches!(
            ScanId::parse(identifier, scheme),
            Err(DatmanError::InvalidId(_))
        ));
    }

    #[test]
    fn test_detect() {
        let (scheme, _) = ScanId::detect("SPN01_CMH_0001_01_SE01_MR").unwrap();
        assert_eq!(scheme, IdScheme::Kcni);
        let (scheme, _) = ScanId::detect("SPINS_CMH_0001_01_01").unwrap();
        assert_eq!(scheme, IdScheme::Datman);
        assert!(ScanId::detect("not-an-id").is_err());
    }

    #[test]
    fn test_format_both_schemes() {
        let id = ScanId::parse("SPN01_CMH_0001_01_SE01_MR", IdScheme::Kcni).unwrap();
        assert_eq!(id.format(IdScheme::Kcni).unwrap(), "SPN01_CMH_0001_01_SE01_MR");
        assert_eq!(id.format(IdScheme::Datman).unwrap(), "SPN01_CMH_0001_01_01");
    }

    #[test]
    fn test_format_rejects_unspellable() {
        let id = ScanId::parse("SPINS_CMH_0001_01_01", IdScheme::Datman).unwrap();
        assert!(id.format(IdScheme::Kcni).is_err());
    }

    #[test]
    fn test_direction() {
        assert_eq!(Direction::KcniToDatman.reverse(), Direction::DatmanToKcni);
        assert_eq!(Direction::into_scheme(IdScheme::Kcni), Direction::DatmanToKcni);
        assert_eq!(Direction::DatmanToKcni.to_string(), "Datman -> KCNI");
    }

    #[test]
    fn test_scheme_from_str() {
        assert_eq!("KCNI".parse::<IdScheme>().unwrap(), IdScheme::Kcni);
        assert_eq!("datman".parse::<IdScheme>().unwrap(), IdScheme::Datman);
        assert!("bids".parse::<IdScheme>().is_err());
    }
}
