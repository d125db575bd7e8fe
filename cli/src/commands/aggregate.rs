// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Composite aggregate commands
//!
//! Commands: template

use anyhow::{Context, Result};
use clap::Subcommand;

use provisioner_core::domain::aggregate::CompositeAggregate;

#[derive(Subcommand)]
pub enum AggregateCommand {
    /// Print a sample composite aggregate for schema discovery
    Template {
        /// Print compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },
}

pub async fn handle_command(command: AggregateCommand) -> Result<()> {
    match command {
        AggregateCommand::Template { compact } => template(compact),
    }
}

fn template(compact: bool) -> Result<()> {
    println!("{}", render_template(compact)?);
    Ok(())
}

fn render_template(compact: bool) -> Result<String> {
    let template = CompositeAggregate::document_template();
    let rendered = if compact {
        serde_json::to_string(&template)
    } else {
        serde_json::to_string_pretty(&template)
    };
    rendered.context("Failed to serialize aggregate template")
}
