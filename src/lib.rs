// Datman - MRI study configuration, scan classification and id conversion
// Copyright (c) 2025 Datman Contributors
// Licensed under the MIT License

//! # Datman - MRI study metadata core
//!
//! Datman manages neuroimaging studies collected across scanner sites. This
//! library holds the pieces every pipeline stage depends on:
//!
//! - **Resolving** layered study configuration (system, study, site)
//! - **Classifying** acquired series into study-defined tags
//! - **Converting** session identifiers between KCNI and Datman naming
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration documents, validation and the resolver
//! - [`classify`] - Series classification and count reconciliation
//! - [`ids`] - Session identifiers and id mapping
//! - [`domain`] - Errors and the `(study, site)` context
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datman::classify::{ScanClassifier, SeriesRecord};
//! use datman::config::load_config;
//! use datman::ids::{Direction, IdConverter};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = load_config("main_config.toml", "local")?;
//!
//! // Which tags does a series belong to at this site?
//! let tags = resolver.tags(Some("SPINS"), Some("CMH"))?;
//! let classifier = ScanClassifier::new(&tags)?;
//! let result = classifier.classify(&SeriesRecord::new("Sag_T1w_MPRAGE"));
//! println!("{:?}", result.tags().collect::<Vec<_>>());
//!
//! // What is this scanner session called in the archive?
//! let converter = IdConverter::new(resolver.id_mapping(Some("SPINS"), None)?);
//! let datman_id = converter.convert_str("SPN01_CMH_1P0042_01_SE01_MR", Direction::KcniToDatman)?;
//! println!("{datman_id}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`], whose error type
//! [`domain::DatmanError`] names the offending key, tag or identifier and the
//! `(study, site)` context it was raised in.
//!
//! ## Logging
//!
//! Datman uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!(study = "SPINS", site = "CMH", "Classifying session");
//! warn!(tag = "RST", expected = 3, observed = 2, "Series count does not match expected count");
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ids;
pub mod logging;
