// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task Workflow State
//!
//! Generic record for multi-stage asynchronous workflows. A task carries two
//! levels of progress:
//!
//! - [`TaskStage`]: the coarse lifecycle shared by every workflow
//!   (`Created -> Started -> Finished | Failed`).
//! - A workflow-specific sub-stage (any type implementing [`SubStage`]) that
//!   drives dispatch while the task is `Started`.
//!
//! Workflow-specific fields live in the `data` payload.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Task record, callback contract, task errors

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::provisioning::ServiceError;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage shared by all task workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStage {
    Created,
    Started,
    Finished,
    Failed,
}

impl TaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Finished | TaskStage::Failed)
    }
}

/// Workflow-specific sub-stage.
///
/// Variants must be declared in transition order: the engine only moves a
/// task forward (`next > current`), and never out of a terminal sub-stage.
pub trait SubStage:
    Copy + Eq + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Sub-stage a freshly started task is dispatched in
    fn initial() -> Self;

    fn is_terminal(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A downstream entity (tracker, provisioned resource) could not be created
    DependencyCreation,
    /// A stage handler failed unexpectedly
    Handler,
}

/// Error accumulated on a task and propagated untouched to the failure callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Where and how a task reports its final outcome.
///
/// A callback without `service_link` is empty: the task completes without
/// notifying anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCallback {
    #[serde(default)]
    pub service_link: Option<String>,

    /// Sub-stage the parent should move to when this task finishes
    #[serde(default)]
    pub finished_sub_stage: String,

    /// Sub-stage the parent should move to when this task fails
    #[serde(default)]
    pub failed_sub_stage: String,
}

impl TaskCallback {
    pub fn create(
        service_link: impl Into<String>,
        finished_sub_stage: impl Into<String>,
        failed_sub_stage: impl Into<String>,
    ) -> Self {
        Self {
            service_link: Some(service_link.into()),
            finished_sub_stage: finished_sub_stage.into(),
            failed_sub_stage: failed_sub_stage.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.service_link.as_deref().map_or(true, str::is_empty)
    }

    /// Fresh copy of the declared "finished" response.
    pub fn finished_response(&self, task_id: TaskId) -> CallbackResponse {
        CallbackResponse {
            task_id,
            task_stage: TaskStage::Finished,
            sub_stage: self.finished_sub_stage.clone(),
            custom_properties: HashMap::new(),
            failure: None,
            result: None,
        }
    }

    /// Fresh copy of the declared "failed" response carrying `failure`.
    pub fn failed_response(
        &self,
        task_id: TaskId,
        failure: Option<TaskFailure>,
    ) -> CallbackResponse {
        CallbackResponse {
            task_id,
            task_stage: TaskStage::Failed,
            sub_stage: self.failed_sub_stage.clone(),
            custom_properties: HashMap::new(),
            failure,
            result: None,
        }
    }
}

/// Body delivered to the callback target when a task reaches a terminal stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub task_id: TaskId,
    pub task_stage: TaskStage,
    pub sub_stage: String,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
    /// Workflow-specific result data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState<S, D> {
    pub id: TaskId,
    pub stage: TaskStage,
    pub sub_stage: S,

    /// Link of the tracker observing this task; created on start if absent
    #[serde(default)]
    pub request_tracker_link: Option<String>,

    /// Free-form correlation data (e.g. the composition context identifier)
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,

    #[serde(default)]
    pub tenant_links: Vec<String>,

    #[serde(default)]
    pub callback: TaskCallback,

    #[serde(default)]
    pub failure: Option<TaskFailure>,

    pub data: D,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<S: SubStage, D> TaskState<S, D> {
    pub fn new(data: D) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            stage: TaskStage::Created,
            sub_stage: S::initial(),
            request_tracker_link: None,
            custom_properties: HashMap::new(),
            tenant_links: Vec::new(),
            callback: TaskCallback::empty(),
            failure: None,
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

impl<S, D> TaskState<S, D> {
    pub fn custom_property(&self, key: &str) -> Option<&str> {
        self.custom_properties.get(key).map(String::as_str)
    }

    pub fn record_failure(&mut self, failure: TaskFailure) {
        self.failure = Some(failure);
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to create {entity}: {source}")]
    DependencyCreation {
        entity: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Illegal sub-stage transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: TaskId,
        from: String,
        to: String,
    },

    #[error("Stage handler failed: {0}")]
    Handler(String),

    #[error("Failed to notify task callback: {0}")]
    Notification(#[source] ServiceError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
