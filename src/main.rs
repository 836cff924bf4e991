// Datman - MRI study configuration, scan classification and id conversion
// Copyright (c) 2025 Datman Contributors
// Licensed under the MIT License

use clap::Parser;
use datman::cli::{Cli, Commands, EXIT_FATAL};
use datman::config::LoggingConfig;
use datman::logging::init_logging;
use std::process;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("warn");
    let logging_config = match &cli.log_dir {
        Some(dir) => LoggingConfig {
            local_enabled: true,
            local_path: dir.display().to_string(),
            ..LoggingConfig::default()
        },
        None => LoggingConfig::default(),
    };
    let guard = match init_logging(log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(EXIT_FATAL);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config,
        system = %cli.system,
        "Datman"
    );

    let exit_code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            EXIT_FATAL
        }
    };

    // process::exit skips destructors; flush file logs first
    drop(guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::ValidateConfig(args) => args.execute(&cli.config, &cli.system).await,
        Commands::Get(args) => args.execute(&cli.config, &cli.system).await,
        Commands::Tags(args) => args.execute(&cli.config, &cli.system).await,
        Commands::Classify(args) => args.execute(&cli.config, &cli.system).await,
        Commands::Convert(args) => args.execute(&cli.config, &cli.system).await,
    }
}
