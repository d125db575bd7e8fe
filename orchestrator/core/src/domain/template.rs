// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Description templates: the blueprints composite aggregates are deployed from.
//!
//! A template whose `parent_link` is set is a per-deployment clone of a shared
//! parent template; clones go away together with the aggregate that was
//! deployed from them, shared templates stay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::provisioning::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionTemplate {
    pub link: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_link: Option<String>,

    /// Member component descriptions, one per component type
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
}

impl DescriptionTemplate {
    pub fn is_clone(&self) -> bool {
        self.parent_link.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Outcome of a delete request against an external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait DescriptionTemplateStore: Send + Sync {
    async fn get(&self, link: &str) -> Result<Option<DescriptionTemplate>, ServiceError>;

    async fn delete(&self, link: &str) -> Result<DeleteOutcome, ServiceError>;
}
