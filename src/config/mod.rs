//! Layered configuration for Datman.
//!
//! Configuration comes from three kinds of TOML document:
//!
//! - the **system** document (one per installation) with a `SystemSettings`
//!   block per deployment, the `Projects` registry and the `ExportSettings`
//!   tag defaults
//! - one **study** document per managed study
//! - **site** blocks nested under `Sites.<tag>` inside a study document
//!
//! A query names its `(study, site)` context explicitly and the most specific
//! level that defines the key wins: site, then study, then system.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use datman::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = load_config("main_config.toml", "local")?;
//!
//! let archive = resolver.require_str("XnatArchive", Some("SPINS"), Some("CMH"))?;
//! println!("XNAT archive: {archive}");
//!
//! for tag in resolver.tags(Some("SPINS"), Some("CMH"))?.active() {
//!     println!("{} -> {:?}", tag.name, tag.formats);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! # main_config.toml
//! [SystemSettings.local]
//! DatmanProjectsDir = "${DM_ARCHIVE}/data"
//! Queue = "slurm"
//!
//! [Projects]
//! SPINS = "SPINS_settings.toml"
//!
//! [ExportSettings.T1]
//! Formats = ["nii", "dcm"]
//! QcType = "anat"
//! ```
//!
//! ```toml
//! # SPINS_settings.toml
//! StudyTag = "SPN01"
//! ProjectDir = "SPINS"
//!
//! [Sites.CMH.ExportInfo.T1]
//! Pattern = { SeriesDescription = ["T1w", "MPRAGE"] }
//! Count = 1
//! ```
//!
//! `${VAR_NAME}` placeholders are substituted from the environment before a
//! document is parsed.

pub mod document;
pub mod loader;
pub mod resolver;
pub mod schema;
pub mod tags;
pub mod value;

// Re-export commonly used types
pub use document::{ConfigDocument, Origin};
pub use loader::{load_config, load_from_env, read_document, CONFIG_ENV, SYSTEM_ENV};
pub use resolver::{ConfigResolver, Resolved, Setting};
pub use schema::{is_known_key, LoggingConfig, KNOWN_KEYS};
pub use tags::{SeriesPattern, TagDefinition, TagSet};
pub use value::{ConfigMap, ConfigValue};
