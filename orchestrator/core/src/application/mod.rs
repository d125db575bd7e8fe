// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod entity_locks;
pub mod aggregate_service;
pub mod task_engine;
pub mod allocation;

// Re-export use cases for convenience
pub use aggregate_service::{
    AggregateLifecycleService, CascadeOutcome, PatchResponse, PatchStatus,
    StandardAggregateLifecycleService,
};
pub use allocation::{AllocationData, AllocationState, AllocationSubStage, AllocationWorkflow};
pub use task_engine::{
    StageOutcome, StartTaskRequest, StartedTask, TaskEngine, TaskPatchOutcome, TaskWorkflow,
};
