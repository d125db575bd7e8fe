// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the provisioner CLI

pub mod aggregate;
pub mod config;
pub mod demo;

pub use self::aggregate::AggregateCommand;
pub use self::config::ConfigCommand;
pub use self::demo::DemoCommand;
