//! Layered configuration resolution
//!
//! [`ConfigResolver`] answers "what is the effective value of key K for study S
//! at site T?" by walking the precedence chain
//!
//! 1. the site block `Sites.<site>` inside the study document,
//! 2. the top level of the study document,
//! 3. the system document, where the active `SystemSettings.<system>` block is
//!    consulted before the rest of the document.
//!
//! The first level that defines the key wins in full. The one exception is
//! tag definitions (see [`super::tags`]), which back-fill export attributes
//! field by field from the global `ExportSettings`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use datman::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = load_config("main_config.toml", "local")?;
//!
//! let archive = resolver.require("XnatArchive", Some("SPINS"), Some("CMH"))?;
//! println!("{} (from {})", archive.value, archive.origin);
//!
//! let tags = resolver.tags(Some("SPINS"), Some("CMH"))?;
//! println!("{} tags collected", tags.active().count());
//! # Ok(())
//! # }
//! ```

use super::document::{ConfigDocument, Origin};
use super::schema::{is_known_key, validate_study, validate_system};
use super::tags::TagSet;
use super::value::ConfigValue;
use crate::domain::{DatmanError, Result, StudyContext};
use crate::ids::{Direction, IdMapping, IdScheme, ScanId};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// A value found by the resolver and the level it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setting<'a> {
    pub value: &'a ConfigValue,
    pub origin: Origin,
}

/// Outcome of a resolution; `Missing` is a normal answer, not an error
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Found(Setting<'a>),
    Missing,
}

impl<'a> Resolved<'a> {
    pub fn value(&self) -> Option<&'a ConfigValue> {
        match self {
            Resolved::Found(setting) => Some(setting.value),
            Resolved::Missing => None,
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            Resolved::Found(setting) => Some(setting.origin),
            Resolved::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Resolved::Missing)
    }

    pub fn setting(self) -> Option<Setting<'a>> {
        match self {
            Resolved::Found(setting) => Some(setting),
            Resolved::Missing => None,
        }
    }
}

#[derive(Debug)]
struct StudyEntry {
    tag: String,
    document: ConfigDocument,
}

type CacheKey = (Option<String>, Option<String>);

/// Resolves settings, tag definitions and id mappings for any context
///
/// The resolver is immutable after construction apart from its view caches,
/// and is safe to share between threads behind an `Arc`.
#[derive(Debug)]
pub struct ConfigResolver {
    system_name: String,
    system: ConfigDocument,
    deployment: ConfigValue,
    studies: BTreeMap<String, StudyEntry>,
    tag_cache: RwLock<HashMap<CacheKey, Arc<TagSet>>>,
    id_map_cache: RwLock<HashMap<CacheKey, Arc<IdMapping>>>,
}

impl ConfigResolver {
    /// Validates the documents and builds a resolver
    ///
    /// `studies` maps project names (as registered under `Projects`) to their
    /// study documents.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the system document defines no
    /// deployment or lacks `system`, if a study is not registered under
    /// `Projects`, if two studies share a `StudyTag`, or if any document fails
    /// schema validation.
    pub fn new(
        system: ConfigDocument,
        system_name: &str,
        studies: BTreeMap<String, ConfigDocument>,
    ) -> Result<Self> {
        let global = StudyContext::global();
        let deployment = ConfigValue::Map(validate_system(&system, system_name)?.clone());

        let export_settings = system.get("ExportSettings").and_then(ConfigValue::as_map);
        let registry = system.get("Projects").and_then(ConfigValue::as_map);

        let mut entries = BTreeMap::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        for (name, document) in studies {
            if !registry.is_some_and(|projects| projects.contains_key(&name)) {
                return Err(DatmanError::config(
                    format!("study '{name}' is not registered under Projects"),
                    &global,
                ));
            }

            let tag = validate_study(&name, &document, export_settings)?;
            if let Some(previous) = owners.insert(tag.clone(), name.clone()) {
                return Err(DatmanError::config(
                    format!("StudyTag '{tag}' is declared by both '{previous}' and '{name}'"),
                    &global,
                ));
            }
            entries.insert(name, StudyEntry { tag, document });
        }

        tracing::info!(
            system = system_name,
            source = system.source(),
            studies = entries.len(),
            "Configuration loaded"
        );

        Ok(Self {
            system_name: system_name.to_string(),
            system,
            deployment,
            studies: entries,
            tag_cache: RwLock::new(HashMap::new()),
            id_map_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Name of the active deployment
    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    pub fn system_document(&self) -> &ConfigDocument {
        &self.system
    }

    /// Registered projects that have a loaded study document, in name order
    pub fn projects(&self) -> impl Iterator<Item = &str> {
        self.studies.keys().map(String::as_str)
    }

    pub fn study_tag(&self, study: &str) -> Result<&str> {
        Ok(self.study(study)?.tag.as_str())
    }

    /// Site tags declared under the study's `Sites`
    pub fn sites(&self, study: &str) -> Result<Vec<&str>> {
        Ok(self
            .study(study)?
            .document
            .get("Sites")
            .and_then(ConfigValue::as_map)
            .map(|sites| sites.keys().map(String::as_str).collect())
            .unwrap_or_default())
    }

    /// Finds the project whose `StudyTag` is `tag`
    pub fn project_for_tag(&self, tag: &str) -> Option<&str> {
        self.studies
            .iter()
            .find(|(_, entry)| entry.tag == tag)
            .map(|(name, _)| name.as_str())
    }

    /// Finds the project a session identifier belongs to
    ///
    /// Datman identifiers carry the `StudyTag` directly. KCNI identifiers are
    /// translated with the project's `IdMap`, at study level and in every
    /// site block that overrides it.
    ///
    /// # Errors
    ///
    /// Fails if no project claims the identifier's study, or if the site is not
    /// declared for that project.
    pub fn project_for_id(&self, id: &ScanId, scheme: IdScheme) -> Result<&str> {
        for (name, entry) in &self.studies {
            if !self.claims_study(name, &entry.tag, id, scheme)? {
                continue;
            }

            if !self.sites(name)?.is_empty() && self.site_for_id(name, id, scheme)?.is_none() {
                return Err(DatmanError::config(
                    format!("site '{}' of '{id}' is not configured", id.site),
                    &StudyContext::study(name.as_str()),
                ));
            }
            return Ok(name.as_str());
        }

        Err(DatmanError::config(
            format!("no project is configured for study '{}' of '{id}'", id.study),
            &StudyContext::global(),
        ))
    }

    /// Declared site of `study` that a session identifier belongs to, in
    /// Datman naming
    ///
    /// A KCNI site code belongs to the declared site whose effective `IdMap`
    /// renames it to that site, so a site-level `IdMap.Site` is honoured.
    /// Returns `None` when no declared site matches.
    pub fn site_for_id(&self, study: &str, id: &ScanId, scheme: IdScheme) -> Result<Option<String>> {
        for site in self.sites(study)? {
            let matches = match scheme {
                IdScheme::Datman => id.site == site,
                IdScheme::Kcni => {
                    let mapping = self.id_mapping(Some(study), Some(site))?;
                    mapping.map_site(&id.site, Direction::KcniToDatman) == site
                }
            };
            if matches {
                return Ok(Some(site.to_string()));
            }
        }
        Ok(None)
    }

    fn claims_study(&self, name: &str, tag: &str, id: &ScanId, scheme: IdScheme) -> Result<bool> {
        if scheme == IdScheme::Datman {
            return Ok(id.study == tag);
        }

        let study_level = self.id_mapping(Some(name), None)?;
        if study_level.map_study(&id.study, Direction::KcniToDatman) == tag {
            return Ok(true);
        }
        for site in self.sites(name)? {
            let mapping = self.id_mapping(Some(name), Some(site))?;
            if mapping.map_study(&id.study, Direction::KcniToDatman) == tag {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Resolves `key` for the given context
    ///
    /// `key` may be a dotted path such as `Paths.nii`. The first segment is
    /// resolved with whole-value precedence and the rest of the path is read
    /// from the winning value only, so a study `Paths` table hides every
    /// system `Paths` entry. Returns [`Resolved::Missing`] when no level
    /// defines the key.
    ///
    /// # Errors
    ///
    /// Fails only if the context itself is invalid: an unknown study, a site
    /// that the study does not declare, or a site without a study.
    pub fn resolve(&self, key: &str, study: Option<&str>, site: Option<&str>) -> Result<Resolved<'_>> {
        let context = StudyContext::new(study, site);
        let path = split_key(key, &context)?;
        let (document, site_block) = self.scope(&context)?;
        let (head, rest) = path.split_at(1);

        let winner = if let Some(value) = site_block.and_then(|block| block.lookup(head)) {
            Some((value, Origin::Site))
        } else if let Some(value) = document.and_then(|doc| doc.lookup(head)) {
            Some((value, Origin::Study))
        } else {
            self.system_lookup(head).map(|value| (value, Origin::System))
        };

        Ok(winner
            .and_then(|(value, origin)| value.lookup(rest).map(|value| Setting { value, origin }))
            .map(Resolved::Found)
            .unwrap_or(Resolved::Missing))
    }

    /// Resolves a setting the caller cannot do without
    ///
    /// # Errors
    ///
    /// Rejects keys outside the configuration vocabulary with a configuration
    /// error, and returns [`DatmanError::MissingRequiredSetting`] when the key
    /// is absent at every level.
    pub fn require(&self, key: &str, study: Option<&str>, site: Option<&str>) -> Result<Setting<'_>> {
        let context = StudyContext::new(study, site);
        if !is_known_key(key) {
            return Err(DatmanError::config(
                format!("unknown setting '{key}'"),
                &context,
            ));
        }
        self.resolve(key, study, site)?
            .setting()
            .ok_or_else(|| DatmanError::missing(key, &context))
    }

    /// Like [`require`](Self::require) but the value must be a string
    pub fn require_str(&self, key: &str, study: Option<&str>, site: Option<&str>) -> Result<&str> {
        let setting = self.require(key, study, site)?;
        setting.value.as_str().ok_or_else(|| {
            DatmanError::config(
                format!(
                    "setting '{key}' must be a string, found {} (from {})",
                    setting.value.kind(),
                    setting.origin
                ),
                &StudyContext::new(study, site),
            )
        })
    }

    /// Tag definitions for a context, built on first use and cached
    pub fn tags(&self, study: Option<&str>, site: Option<&str>) -> Result<Arc<TagSet>> {
        let key = cache_key(study, site);
        if let Some(hit) = read_cache(&self.tag_cache, &key) {
            return Ok(hit);
        }

        let context = StudyContext::new(study, site);
        let export_settings = self
            .system
            .get("ExportSettings")
            .and_then(ConfigValue::as_map);

        let export_info = match self.resolve("ExportInfo", study, site)? {
            Resolved::Found(setting) => {
                let entries = setting.value.as_map().ok_or_else(|| {
                    DatmanError::config("'ExportInfo' must be a mapping", &context)
                })?;
                Some((entries, setting.origin))
            }
            Resolved::Missing => None,
        };

        let tags = Arc::new(TagSet::build(context, export_settings, export_info)?);
        Ok(write_cache(&self.tag_cache, key, tags))
    }

    /// Identifier mapping for a context, compiled on first use and cached
    pub fn id_mapping(&self, study: Option<&str>, site: Option<&str>) -> Result<Arc<IdMapping>> {
        let key = cache_key(study, site);
        if let Some(hit) = read_cache(&self.id_map_cache, &key) {
            return Ok(hit);
        }

        let context = StudyContext::new(study, site);
        let mapping = match self.resolve("IdMap", study, site)?.value() {
            Some(value) => IdMapping::from_value(value, context)?,
            None => IdMapping::empty(context),
        };
        Ok(write_cache(&self.id_map_cache, key, Arc::new(mapping)))
    }

    /// `DatmanProjectsDir/ProjectDir` for a study
    pub fn study_base(&self, study: &str) -> Result<PathBuf> {
        let root = self.require_str("DatmanProjectsDir", Some(study), None)?;
        let project = self.require_str("ProjectDir", Some(study), None)?;
        Ok(PathBuf::from(root).join(project))
    }

    /// Location of a study sub-directory declared under `Paths`
    pub fn get_path(&self, kind: &str, study: &str) -> Result<PathBuf> {
        let relative = self.require_str(&format!("Paths.{kind}"), Some(study), None)?;
        Ok(self.study_base(study)?.join(relative))
    }

    fn study(&self, study: &str) -> Result<&StudyEntry> {
        self.studies.get(study).ok_or_else(|| {
            DatmanError::config(
                format!(
                    "unknown study '{study}' (configured: {})",
                    self.studies.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
                &StudyContext::global(),
            )
        })
    }

    fn scope(&self, context: &StudyContext) -> Result<(Option<&ConfigDocument>, Option<&ConfigValue>)> {
        let Some(study) = context.study.as_deref() else {
            return match context.site {
                Some(_) => Err(DatmanError::config("a site requires a study", context)),
                None => Ok((None, None)),
            };
        };

        let document = &self.study(study)?.document;
        let site_block = match context.site.as_deref() {
            Some(site) => Some(
                document
                    .lookup(&["Sites", site])
                    .ok_or_else(|| DatmanError::config(format!("site '{site}' is not declared"), context))?,
            ),
            None => None,
        };
        Ok((Some(document), site_block))
    }

    fn system_lookup(&self, path: &[&str]) -> Option<&ConfigValue> {
        self.deployment
            .lookup(path)
            .or_else(|| self.system.lookup(path))
    }
}

fn split_key<'k>(key: &'k str, context: &StudyContext) -> Result<Vec<&'k str>> {
    let path: Vec<&str> = key.split('.').collect();
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(DatmanError::config(
            format!("invalid setting name '{key}'"),
            context,
        ));
    }
    Ok(path)
}

fn cache_key(study: Option<&str>, site: Option<&str>) -> CacheKey {
    (study.map(str::to_string), site.map(str::to_string))
}

fn read_cache<T>(cache: &RwLock<HashMap<CacheKey, Arc<T>>>, key: &CacheKey) -> Option<Arc<T>> {
    cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

fn write_cache<T>(cache: &RwLock<HashMap<CacheKey, Arc<T>>>, key: CacheKey, value: Arc<T>) -> Arc<T> {
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key)
        .or_insert(value)
        .clone()
}

impl ConfigResolver {
    /// Builds a resolver from in-memory TOML texts
    pub fn from_toml_strs(system: &str, system_name: &str, studies: &[(&str, &str)]) -> Result<Self> {
        let system = ConfigDocument::from_toml_str(system, "<system>")?;
        let studies = studies
            .iter()
            .map(|(name, text)| {
                Ok((
                    name.to_string(),
                    ConfigDocument::from_toml_str(text, format!("<{name}>"))?,
                ))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Self::new(system, system_name, studies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM: &str = r#"
        Queue = "sge"

        [SystemSettings.local]
        DatmanProjectsDir = "/archive/data"
        Queue = "slurm"

        [Projects]
        SPINS = "SPINS_settings.toml"
        ASCEND = "ASCEND_settings.toml"

        [Paths]
        nii = "data/nii/"
        dcm = "data/dcm/"

        [ExportSettings.T1]
        Formats = ["nii", "dcm"]
        QcType = "anat"

        [ExportSettings.RST]
        Formats = ["nii"]
        QcType = "fmri"
    "#;

    const SPINS: &str = r#"
        StudyTag = "SPN01"
        ProjectDir = "SPINS"
        XnatArchive = "SPINS"

        [Paths]
        nii = "nifti/"

        [ExportInfo.T1]
        Pattern = { SeriesDescription = "T1w" }
        Count = 1

        [Sites.CMH]
        XnatArchive = "SPN01_CMH"

        [Sites.CMH.ExportInfo.RST]
        Pattern = { SeriesDescription = "RST" }
        Count = 3

        [Sites.ZHH]
    "#;

    const ASCEND: &str = r#"
        StudyTag = "ASC01"
        ProjectDir = "ASCEND"
        [Sites.CMH]
    "#;

    fn resolver() -> ConfigResolver {
        ConfigResolver::from_toml_strs(SYSTEM, "local", &[("SPINS", SPINS), ("ASCEND", ASCEND)])
            .unwrap()
    }

    #[test]
    fn test_system_only_key() {
        let r = resolver();
        let a = r.resolve("ExportSettings.T1.QcType", Some("SPINS"), Some("CMH")).unwrap();
        let b = r.resolve("ExportSettings.T1.QcType", Some("SPINS"), None).unwrap();
        let c = r.resolve("ExportSettings.T1.QcType", None, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.origin(), Some(Origin::System));
    }

    #[test]
    fn test_deployment_block_wins_over_system_document() {
        let r = resolver();
        let queue = r.resolve("Queue", None, None).unwrap();
        assert_eq!(queue.value().and_then(ConfigValue::as_str), Some("slurm"));
    }

    #[test]
    fn test_study_and_site_precedence() {
        let r = resolver();
        let study = r.resolve("XnatArchive", Some("SPINS"), Some("ZHH")).unwrap();
        assert_eq!(study.value().and_then(ConfigValue::as_str), Some("SPINS"));
        assert_eq!(study.origin(), Some(Origin::Study));

        let site = r.resolve("XnatArchive", Some("SPINS"), Some("CMH")).unwrap();
        assert_eq!(site.value().and_then(ConfigValue::as_str), Some("SPN01_CMH"));
        assert_eq!(site.origin(), Some(Origin::Site));
    }

    #[test]
    fn test_whole_value_precedence() {
        let r = resolver();
        // The study's Paths replaces the system Paths in full
        let paths = r.resolve("Paths", Some("SPINS"), None).unwrap();
        let paths = paths.value().and_then(ConfigValue::as_map).unwrap();
        assert!(paths.get("dcm").is_none());
        assert_eq!(paths.get("nii").and_then(ConfigValue::as_str), Some("nifti/"));

        // Dotted keys read from the winning table and never fall through
        assert!(r.resolve("Paths.dcm", Some("SPINS"), None).unwrap().is_missing());
        let dcm = r.resolve("Paths.dcm", Some("ASCEND"), None).unwrap();
        assert_eq!(dcm.origin(), Some(Origin::System));
        assert!(r.get_path("dcm", "SPINS").is_err());
    }

    #[test]
    fn test_dotted_key_follows_site_export_info() {
        let r = resolver();
        // The CMH site block replaces the study ExportInfo, which hides T1
        assert!(r.resolve("ExportInfo.T1", Some("SPINS"), Some("CMH")).unwrap().is_missing());
        assert!(!r.tags(Some("SPINS"), Some("CMH")).unwrap().get("T1").unwrap().active);

        let rst = r.resolve("ExportInfo.RST.Count", Some("SPINS"), Some("CMH")).unwrap();
        assert_eq!(rst.origin(), Some(Origin::Site));
        let t1 = r.resolve("ExportInfo.T1", Some("SPINS"), Some("ZHH")).unwrap();
        assert_eq!(t1.origin(), Some(Origin::Study));
    }

    #[test]
    fn test_missing_is_sentinel() {
        let r = resolver();
        assert!(r.resolve("RedcapApi", Some("SPINS"), None).unwrap().is_missing());
        assert!(r.resolve("NotAKey", None, None).unwrap().is_missing());
    }

    #[test]
    fn test_require_errors() {
        let r = resolver();
        let err = r.require("RedcapApi", Some("SPINS"), Some("CMH")).unwrap_err();
        assert!(matches!(err, DatmanError::MissingRequiredSetting { .. }));
        assert!(err.to_string().contains("site 'CMH'"));

        let err = r.require("NotAKey", Some("SPINS"), None).unwrap_err();
        assert!(matches!(err, DatmanError::Config { .. }));
        assert!(err.to_string().contains("unknown setting 'NotAKey'"));
    }

    #[test]
    fn test_invalid_context() {
        let r = resolver();
        assert!(r.resolve("Paths", Some("NOPE"), None).is_err());
        assert!(r.resolve("Paths", Some("SPINS"), Some("UTO")).is_err());
        assert!(r.resolve("Paths", None, Some("CMH")).is_err());
        assert!(r.resolve("Paths..nii", None, None).is_err());
    }

    #[test]
    fn test_site_export_info_replaces_study_export_info() {
        let r = resolver();
        let cmh = r.tags(Some("SPINS"), Some("CMH")).unwrap();
        let active: Vec<&str> = cmh.active().map(|t| t.name.as_str()).collect();
        assert_eq!(active, vec!["RST"]);

        let zhh = r.tags(Some("SPINS"), Some("ZHH")).unwrap();
        let active: Vec<&str> = zhh.active().map(|t| t.name.as_str()).collect();
        assert_eq!(active, vec!["T1"]);
        assert_eq!(zhh.get("T1").unwrap().formats, vec!["nii", "dcm"]);
    }

    #[test]
    fn test_tags_are_cached() {
        let r = resolver();
        let first = r.tags(Some("SPINS"), Some("CMH")).unwrap();
        let second = r.tags(Some("SPINS"), Some("CMH")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_duplicate_study_tag() {
        let err = ConfigResolver::from_toml_strs(
            SYSTEM,
            "local",
            &[("SPINS", SPINS), ("ASCEND", "StudyTag = \"SPN01\"")],
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("StudyTag 'SPN01'"));
        assert!(msg.contains("ASCEND"));
        assert!(msg.contains("SPINS"));
    }

    #[test]
    fn test_unregistered_study() {
        let err = ConfigResolver::from_toml_strs(SYSTEM, "local", &[("OTHER", "StudyTag = \"OTH01\"")])
            .unwrap_err();
        assert!(err.to_string().contains("not registered under Projects"));
    }

    #[test]
    fn test_paths() {
        let r = resolver();
        assert_eq!(
            r.study_base("SPINS").unwrap(),
            PathBuf::from("/archive/data/SPINS")
        );
        assert_eq!(
            r.get_path("nii", "SPINS").unwrap(),
            PathBuf::from("/archive/data/SPINS/nifti/")
        );
        assert!(matches!(
            r.get_path("qc", "SPINS").unwrap_err(),
            DatmanError::MissingRequiredSetting { .. }
        ));
    }

    #[test]
    fn test_resolver_is_shareable() {
        fn check<T: Send + Sync>() {}
        check::<ConfigResolver>();
    }

    #[test]
    fn test_project_lookup() {
        let r = resolver();
        assert_eq!(r.project_for_tag("ASC01"), Some("ASCEND"));
        assert_eq!(r.project_for_tag("XXX01"), None);
        assert_eq!(r.sites("SPINS").unwrap(), vec!["CMH", "ZHH"]);
        assert_eq!(r.study_tag("SPINS").unwrap(), "SPN01");
    }
}
