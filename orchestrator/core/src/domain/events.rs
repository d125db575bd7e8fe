// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregate::AggregateId;
use crate::domain::task::{TaskFailure, TaskId};

/// Composite aggregate lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AggregateEvent {
    AggregateCreated {
        aggregate_id: AggregateId,
        name: String,
        created_at: DateTime<Utc>,
    },
    AggregateReplaced {
        aggregate_id: AggregateId,
        replaced_at: DateTime<Utc>,
    },
    AggregatePatched {
        aggregate_id: AggregateId,
        modified: bool,
        patched_at: DateTime<Utc>,
    },
    AggregateDeleted {
        aggregate_id: AggregateId,
        deleted_at: DateTime<Utc>,
    },
    CascadeDeleteTriggered {
        aggregate_id: AggregateId,
        description_link: Option<String>,
        triggered_at: DateTime<Utc>,
    },
    /// Networks that are not externally managed keep the aggregate alive
    CascadeDeleteAborted {
        aggregate_id: AggregateId,
        non_external_links: Vec<String>,
        aborted_at: DateTime<Utc>,
    },
}

impl AggregateEvent {
    pub fn aggregate_id(&self) -> &AggregateId {
        match self {
            AggregateEvent::AggregateCreated { aggregate_id, .. }
            | AggregateEvent::AggregateReplaced { aggregate_id, .. }
            | AggregateEvent::AggregatePatched { aggregate_id, .. }
            | AggregateEvent::AggregateDeleted { aggregate_id, .. }
            | AggregateEvent::CascadeDeleteTriggered { aggregate_id, .. }
            | AggregateEvent::CascadeDeleteAborted { aggregate_id, .. } => aggregate_id,
        }
    }
}

/// Task workflow events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskStarted {
        task_id: TaskId,
        workflow: String,
        request_tracker_link: Option<String>,
        started_at: DateTime<Utc>,
    },
    TaskSubStageChanged {
        task_id: TaskId,
        from: String,
        to: String,
        changed_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        result: Option<serde_json::Value>,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        failure: Option<TaskFailure>,
        failed_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::TaskStarted { task_id, .. }
            | TaskEvent::TaskSubStageChanged { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskFailed { task_id, .. } => *task_id,
        }
    }
}
