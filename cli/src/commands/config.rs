// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use provisioner_core::domain::config::OrchestratorConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = OrchestratorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PROVISIONER_CONFIG_PATH: {}",
            std::env::var("PROVISIONER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./provisioner-config.yaml");
        println!("  4. ~/.provisioner/config.yaml");
        println!("  5. /etc/provisioner/config.yaml");
        match OrchestratorConfig::discover_config() {
            Some(path) if config_override.is_none() => println!("  Using: {}", path.display()),
            None if config_override.is_none() => {
                println!("  Using: {}", "(built-in defaults)".dimmed())
            }
            _ => {}
        }
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", render(&config)?);

    Ok(())
}

fn render(config: &OrchestratorConfig) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("{}\n", "Node:".bold()));
    out.push_str(&format!("  Name: {}\n", config.metadata.name));
    if let Some(version) = &config.metadata.version {
        out.push_str(&format!("  Version: {}\n", version));
    }
    out.push('\n');

    let links = &config.spec.links;
    out.push_str(&format!("{}\n", "Link Conventions:".bold()));
    out.push_str(&format!("  Composite components: {}\n", links.composite_components));
    out.push_str(&format!("  Containers: {}\n", links.containers));
    out.push_str(&format!("  Networks: {}\n", links.networks));
    out.push('\n');

    out.push_str(&format!("{}\n", "Event Bus:".bold()));
    out.push_str(&format!("  Capacity: {}\n", config.spec.event_bus.capacity));
    out.push('\n');

    out.push_str(&format!("{}\n", "Observability:".bold()));
    out.push_str(&format!("  Log level: {}\n", config.spec.observability.log_level));
    out.push('\n');

    out.push_str(&format!("{}\n", "Manifest:".bold()));
    let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
    for line in yaml.lines() {
        out.push_str(&format!("  {}\n", line.dimmed()));
    }

    Ok(out)
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = OrchestratorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
