// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entities, value objects and collaborator contracts.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types; no I/O beyond the traits implemented in infrastructure

pub mod link;
pub mod aggregate;
pub mod descriptor;
pub mod template;
pub mod network;
pub mod provisioning;
pub mod task;
pub mod events;
pub mod repository;
pub mod config;
