// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the DDD Repository
//! pattern: one repository per aggregate, interface defined in the domain layer,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AggregateRepository` | `CompositeAggregate` | `InMemoryAggregateRepository` |
//! | `TaskRepository` | `TaskState<S, D>` | `InMemoryTaskRepository` |
//!
//! The replicated document store behind these traits owns durability and
//! indexing; the provisioner only relies on read-your-writes per identity.

use async_trait::async_trait;

use crate::domain::aggregate::{AggregateId, CompositeAggregate};
use crate::domain::task::{TaskId, TaskState};

/// Repository interface for CompositeAggregate aggregates
#[async_trait]
pub trait AggregateRepository: Send + Sync {
    /// Insert a new aggregate; fails with `Conflict` if the identity is taken
    async fn create(&self, aggregate: &CompositeAggregate) -> Result<(), RepositoryError>;

    /// Overwrite an existing aggregate
    async fn save(&self, aggregate: &CompositeAggregate) -> Result<(), RepositoryError>;

    /// Find aggregate by ID
    async fn find_by_id(
        &self,
        id: &AggregateId,
    ) -> Result<Option<CompositeAggregate>, RepositoryError>;

    /// Delete aggregate by ID. Returns false when nothing was stored under the ID.
    async fn delete(&self, id: &AggregateId) -> Result<bool, RepositoryError>;
}

/// Repository interface for task workflow state
#[async_trait]
pub trait TaskRepository<S, D>: Send + Sync
where
    S: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    /// Save task state (create or update)
    async fn save(&self, state: &TaskState<S, D>) -> Result<(), RepositoryError>;

    /// Find task state by ID
    async fn find_by_id(&self, id: TaskId) -> Result<Option<TaskState<S, D>>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
