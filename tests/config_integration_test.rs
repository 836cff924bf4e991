//! Integration tests for configuration loading and resolution
//!
//! Note: Tests that modify environment variables hold ENV_MUTEX to avoid
//! interference between tests.

use datman::config::{load_config, load_from_env, ConfigValue, Origin, Resolved};
use datman::domain::DatmanError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const SYSTEM: &str = r#"
XnatServer = "xnat.example.org"
XnatArchive = "GLOBAL_ARCHIVE"
UsesRedcap = false

[SystemSettings.local]
DatmanProjectsDir = "/archive/data"
Queue = "slurm"

[SystemSettings.scc]
DatmanProjectsDir = "/scc/archive/data"
Queue = "sge"

[Projects]
SPINS = "SPINS_settings.toml"
ASCEND = "ASCEND_settings.toml"

[Paths]
nii = "data/nii/"
dcm = "data/dcm/"
qc = "qc/"

[ExportSettings.T1]
Formats = ["nii", "dcm", "mnc"]
QcType = "anat"

[ExportSettings.RST]
Formats = ["nii"]
QcType = "fmri"
QcPha = "default"

[ExportSettings.DTI60-1000]
Formats = ["nii", "dcm"]
QcType = "dti"
"#;

const SPINS: &str = r#"
StudyTag = "SPINS"
ProjectDir = "SPINS"
FullName = "Social Processes Initiative in Neurobiology of the Schizophrenia(s)"
XnatArchive = "SPINS_ARCHIVE"

[Paths]
qc = "qc_spins/"

[IdMap.Study]
SPN01 = "SPINS"

[ExportInfo.T1]
Pattern = { SeriesDescription = ["T1w", "BRAVO"] }
Count = 1

[ExportInfo.RST]
Pattern = { SeriesDescription = "RST" }
Count = 1

[Sites.CMH]
XnatArchive = "SPINS_CMH"

[Sites.CMH.ExportInfo.T1]
Pattern = { SeriesDescription = "MPRAGE" }
Count = 1

[Sites.CMH.ExportInfo.RST]
Pattern = { SeriesDescription = "RST" }
Count = 3

[Sites.ZHH]
UsesRedcap = true
"#;

const ASCEND: &str = r#"
StudyTag = "ASCEND"
ProjectDir = "ASCEND"

[ExportInfo.DTI60-1000]
Pattern = { SeriesDescription = "DTI-60", ImageType = "ND" }
Count = 1
"#;

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let system = write(dir.path(), "main_config.toml", SYSTEM);
    write(dir.path(), "SPINS_settings.toml", SPINS);
    write(dir.path(), "ASCEND_settings.toml", ASCEND);
    (dir, system)
}

#[test]
fn test_load_complete_config() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    assert_eq!(resolver.system_name(), "local");
    assert_eq!(resolver.projects().collect::<Vec<_>>(), vec!["ASCEND", "SPINS"]);
    assert_eq!(resolver.sites("SPINS").unwrap(), vec!["CMH", "ZHH"]);
    assert!(resolver.sites("ASCEND").unwrap().is_empty());
    assert_eq!(resolver.project_for_tag("ASCEND"), Some("ASCEND"));
}

#[test]
fn test_system_only_key_is_the_same_with_and_without_site() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    let study = resolver.resolve("XnatServer", Some("SPINS"), None).unwrap();
    let site = resolver.resolve("XnatServer", Some("SPINS"), Some("CMH")).unwrap();
    assert_eq!(study, site);
    assert_eq!(study.origin(), Some(Origin::System));
    assert_eq!(study.value().and_then(ConfigValue::as_str), Some("xnat.example.org"));
}

#[test]
fn test_precedence_site_over_study_over_system() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    let global = resolver.require_str("XnatArchive", None, None).unwrap();
    let study = resolver.require_str("XnatArchive", Some("SPINS"), None).unwrap();
    let cmh = resolver.require_str("XnatArchive", Some("SPINS"), Some("CMH")).unwrap();
    let zhh = resolver.require_str("XnatArchive", Some("SPINS"), Some("ZHH")).unwrap();

    assert_eq!(global, "GLOBAL_ARCHIVE");
    assert_eq!(study, "SPINS_ARCHIVE");
    assert_eq!(cmh, "SPINS_CMH");
    assert_eq!(zhh, "SPINS_ARCHIVE");
}

#[test]
fn test_deployment_block_selected_by_system_name() {
    let (_dir, system) = fixture();
    let local = load_config(&system, "local").unwrap();
    let scc = load_config(&system, "scc").unwrap();

    assert_eq!(local.require_str("Queue", Some("SPINS"), None).unwrap(), "slurm");
    assert_eq!(scc.require_str("Queue", Some("SPINS"), None).unwrap(), "sge");
}

#[test]
fn test_dotted_keys_and_paths() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    // The study Paths table replaces the system Paths in full
    let qc = resolver.resolve("Paths.qc", Some("SPINS"), None).unwrap();
    assert_eq!(qc.origin(), Some(Origin::Study));
    assert_eq!(
        resolver.resolve("Paths.nii", Some("SPINS"), None).unwrap(),
        Resolved::Missing
    );
    let nii = resolver.resolve("Paths.nii", Some("ASCEND"), None).unwrap();
    assert_eq!(nii.origin(), Some(Origin::System));

    assert_eq!(
        resolver.get_path("qc", "SPINS").unwrap(),
        PathBuf::from("/archive/data/SPINS/qc_spins/")
    );
    assert_eq!(
        resolver.get_path("nii", "ASCEND").unwrap(),
        PathBuf::from("/archive/data/ASCEND/data/nii/")
    );
    assert!(matches!(
        resolver.get_path("nii", "SPINS"),
        Err(DatmanError::MissingRequiredSetting { .. })
    ));
    assert!(matches!(
        resolver.get_path("mnc", "ASCEND"),
        Err(DatmanError::MissingRequiredSetting { .. })
    ));
}

#[test]
fn test_dotted_export_info_matches_tags() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    let t1 = resolver.resolve("ExportInfo.T1.Pattern", Some("SPINS"), Some("CMH")).unwrap();
    assert_eq!(t1.origin(), Some(Origin::Site));
    let count = resolver.resolve("ExportInfo.RST.Count", Some("SPINS"), Some("CMH")).unwrap();
    assert_eq!(count.value().and_then(ConfigValue::as_integer), Some(3));

    let tags = resolver.tags(Some("SPINS"), Some("CMH")).unwrap();
    assert_eq!(tags.get("RST").unwrap().count, Some(3));
}

#[test]
fn test_missing_and_required() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    assert_eq!(
        resolver.resolve("RedcapApi", Some("SPINS"), None).unwrap(),
        Resolved::Missing
    );
    let err = resolver.require("RedcapApi", Some("SPINS"), Some("CMH")).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("'RedcapApi'"));
    assert!(msg.contains("study 'SPINS', site 'CMH'"));

    let err = resolver.require("NotASetting", Some("SPINS"), None).unwrap_err();
    assert!(matches!(err, DatmanError::Config { .. }));
}

#[test]
fn test_unknown_study_and_site() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    assert!(resolver.resolve("XnatArchive", Some("NOPE"), None).is_err());
    assert!(resolver.resolve("XnatArchive", Some("SPINS"), Some("UTO")).is_err());
    assert!(resolver.resolve("XnatArchive", None, Some("CMH")).is_err());
}

#[test]
fn test_tag_backfill_from_export_settings() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    let tags = resolver.tags(Some("SPINS"), Some("CMH")).unwrap();
    let t1 = tags.get("T1").unwrap();
    assert!(t1.active);
    assert_eq!(t1.origin, Origin::Site);
    assert_eq!(t1.formats, vec!["nii", "dcm", "mnc"]);
    assert_eq!(t1.qc_type.as_deref(), Some("anat"));
    assert_eq!(t1.count, Some(1));
    assert_eq!(
        t1.pattern.as_ref().unwrap().series_description,
        vec!["MPRAGE"]
    );

    let rst = tags.get("RST").unwrap();
    assert_eq!(rst.count, Some(3));
    assert_eq!(rst.qc_pha.as_deref(), Some("default"));

    // Global-only tags expose attributes but are not collected here
    let dti = tags.get("DTI60-1000").unwrap();
    assert!(!dti.active);
    assert_eq!(dti.origin, Origin::System);
}

#[test]
fn test_site_without_export_info_uses_study_tags() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    let tags = resolver.tags(Some("SPINS"), Some("ZHH")).unwrap();
    let t1 = tags.get("T1").unwrap();
    assert_eq!(t1.origin, Origin::Study);
    assert_eq!(t1.pattern.as_ref().unwrap().series_description, vec!["T1w", "BRAVO"]);
}

#[test]
fn test_tag_views_are_cached() {
    let (_dir, system) = fixture();
    let resolver = load_config(&system, "local").unwrap();

    let first = resolver.tags(Some("SPINS"), Some("CMH")).unwrap();
    let second = resolver.tags(Some("SPINS"), Some("CMH")).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[test]
fn test_duplicate_study_tag_rejected() {
    let (dir, system) = fixture();
    write(dir.path(), "ASCEND_settings.toml", &ASCEND.replace("\"ASCEND\"\nProjectDir", "\"SPINS\"\nProjectDir"));

    let err = load_config(&system, "local").unwrap_err();
    assert!(err.to_string().contains("StudyTag 'SPINS'"));
}

#[test]
fn test_unknown_export_info_tag_rejected() {
    let (dir, system) = fixture();
    write(
        dir.path(),
        "ASCEND_settings.toml",
        &format!("{ASCEND}\n[Sites.CMH.ExportInfo.FLAIR]\nPattern = {{ SeriesDescription = \"FLAIR\" }}\n"),
    );

    let err = load_config(&system, "local").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("'FLAIR'"));
    assert!(msg.contains("study 'ASCEND', site 'CMH'"));
}

#[test]
fn test_empty_system_settings_rejected() {
    let dir = TempDir::new().unwrap();
    let system = write(dir.path(), "main_config.toml", "SystemSettings = {}\n");
    let err = load_config(&system, "local").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_environment_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    std::env::set_var("DM_TEST_ARCHIVE_ROOT", "/mnt/archive");

    let dir = TempDir::new().unwrap();
    let system = write(
        dir.path(),
        "main_config.toml",
        &SYSTEM.replace("\"/archive/data\"", "\"${DM_TEST_ARCHIVE_ROOT}/data\""),
    );
    write(dir.path(), "SPINS_settings.toml", SPINS);
    write(dir.path(), "ASCEND_settings.toml", ASCEND);

    let resolver = load_config(&system, "local").unwrap();
    assert_eq!(
        resolver.study_base("SPINS").unwrap(),
        PathBuf::from("/mnt/archive/data/SPINS")
    );

    std::env::remove_var("DM_TEST_ARCHIVE_ROOT");
}

#[test]
fn test_load_from_env() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let (_dir, system) = fixture();

    std::env::set_var("DM_CONFIG", &system);
    std::env::set_var("DM_SYSTEM", "scc");
    let resolver = load_from_env().unwrap();
    assert_eq!(resolver.system_name(), "scc");

    std::env::remove_var("DM_SYSTEM");
    assert!(load_from_env().is_err());
    std::env::remove_var("DM_CONFIG");
}
