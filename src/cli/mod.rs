//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Datman using clap.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Exit code for success
pub const EXIT_OK: i32 = 0;
/// Exit code for configuration errors
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for count mismatches under `--strict`
pub const EXIT_MISMATCH: i32 = 3;
/// Exit code for any other failure
pub const EXIT_FATAL: i32 = 5;

/// Datman - MRI study configuration, scan classification and id conversion
#[derive(Parser, Debug)]
#[command(name = "datman")]
#[command(version, about, long_about = None)]
#[command(author = "Datman Contributors")]
pub struct Cli {
    /// Path to the system configuration document
    #[arg(short, long, default_value = "main_config.toml", env = "DM_CONFIG")]
    pub config: String,

    /// Active deployment under SystemSettings
    #[arg(short, long, default_value = "local", env = "DM_SYSTEM")]
    pub system: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DM_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the system and every study document
    ValidateConfig(commands::validate::ValidateArgs),

    /// Resolve a setting for a study and site
    Get(commands::get::GetArgs),

    /// Show the tag definitions in effect for a study and site
    Tags(commands::tags::TagsArgs),

    /// Classify the series of one or more sessions
    Classify(commands::classify::ClassifyArgs),

    /// Convert session identifiers between KCNI and Datman naming
    Convert(commands::convert::ConvertArgs),
}
