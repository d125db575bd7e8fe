// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Provisioner Core
//!
//! Composite aggregate lifecycle and staged task workflows for resource
//! provisioning.
//!
//! # Architecture
//!
//! - **Domain:** aggregates, task state, polymorphic descriptors, collaborator contracts
//! - **Application:** aggregate lifecycle service, generic task engine, allocation workflow
//! - **Infrastructure:** event bus, in-memory repositories and collaborators

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
