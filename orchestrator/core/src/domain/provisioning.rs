// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Collaborators - Anti-Corruption Layer
//!
//! Contracts for the downstream services a task workflow talks to: the
//! resource provisioning service, the request tracker service and the
//! callback target that receives a task's final outcome. Implementations live
//! outside the domain (see `crate::infrastructure::local` for in-memory ones).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::task::{CallbackResponse, TaskCallback, TaskId};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Request to provision one downstream resource from a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub description_link: String,

    /// Correlation properties copied onto the provisioned resource
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,

    #[serde(default)]
    pub tenant_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Link of the created resource
    pub link: String,
}

#[async_trait]
pub trait ResourceProvisioningService: Send + Sync {
    async fn create(
        &self,
        request: ProvisioningRequest,
    ) -> Result<ProvisionedResource, ServiceError>;
}

/// Request to create a tracker record observing one or more tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRequest {
    pub task_id: TaskId,

    /// Display names of the tasks the tracker reports on
    pub tracked_tasks: Vec<String>,

    #[serde(default)]
    pub custom_properties: HashMap<String, String>,

    #[serde(default)]
    pub tenant_links: Vec<String>,
}

#[async_trait]
pub trait TrackerService: Send + Sync {
    /// Create a tracker and return its link
    async fn create(&self, request: TrackerRequest) -> Result<String, ServiceError>;
}

/// Delivers a task's terminal response to its callback target.
#[async_trait]
pub trait TaskCallbackNotifier: Send + Sync {
    async fn notify(
        &self,
        callback: &TaskCallback,
        response: CallbackResponse,
    ) -> Result<(), ServiceError>;
}
