// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Provisioner CLI
//!
//! The `provisioner` binary inspects node configuration and runs the
//! provisioning workflows against in-process collaborators.
//!
//! ## Commands
//!
//! - `provisioner config show|validate` - Configuration management
//! - `provisioner aggregate template` - Composite aggregate schema discovery
//! - `provisioner demo allocate|cascade` - Local workflow runs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use provisioner_cli::commands::{self, AggregateCommand, ConfigCommand, DemoCommand};
use provisioner_core::domain::config::OrchestratorConfig;

/// Provisioner - composite aggregate and allocation workflow tooling
#[derive(Parser)]
#[command(name = "provisioner")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PROVISIONER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: from config, else info]
    #[arg(long, global = true, env = "PROVISIONER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Composite aggregate operations
    #[command(name = "aggregate")]
    Aggregate {
        #[command(subcommand)]
        command: AggregateCommand,
    },

    /// Run workflows against in-memory collaborators
    #[command(name = "demo")]
    Demo {
        #[command(subcommand)]
        command: DemoCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match &cli.log_level {
        Some(level) => level.clone(),
        // Unreadable config is reported by the command itself.
        None => OrchestratorConfig::load_or_default(cli.config.clone())
            .map(|config| config.spec.observability.log_level)
            .unwrap_or_else(|_| "info".to_string()),
    };
    init_logging(&level)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Aggregate { command }) => {
            commands::aggregate::handle_command(command).await
        }
        Some(Commands::Demo { command }) => {
            let config = OrchestratorConfig::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            commands::demo::handle_command(command, config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
