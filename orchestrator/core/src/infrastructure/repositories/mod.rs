// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! This module provides infrastructure implementations of repository abstractions
//! defined in the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! Lightweight implementations for testing, development and the CLI demos:
//! - **InMemoryAggregateRepository** - Thread-safe HashMap-backed aggregate storage
//! - **InMemoryTaskRepository** - Task state storage, generic over the workflow
//!
//! # Design Principles
//!
//! 1. **Technology Agnostic**: Domain layer has no knowledge of persistence
//! 2. **Error Mapping**: Lock poisoning is mapped to `RepositoryError::Unknown`

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::aggregate::{AggregateId, CompositeAggregate};
use crate::domain::repository::{AggregateRepository, RepositoryError, TaskRepository};
use crate::domain::task::{TaskId, TaskState};

fn poisoned<E>(_: E) -> RepositoryError {
    RepositoryError::Unknown("in-memory store lock poisoned".to_string())
}

#[derive(Clone, Default)]
pub struct InMemoryAggregateRepository {
    aggregates: Arc<RwLock<HashMap<AggregateId, CompositeAggregate>>>,
}

impl InMemoryAggregateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored aggregates
    pub fn len(&self) -> usize {
        self.aggregates.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AggregateRepository for InMemoryAggregateRepository {
    async fn create(&self, aggregate: &CompositeAggregate) -> Result<(), RepositoryError> {
        let mut aggregates = self.aggregates.write().map_err(poisoned)?;
        if aggregates.contains_key(&aggregate.id) {
            return Err(RepositoryError::Conflict(aggregate.id.to_string()));
        }
        aggregates.insert(aggregate.id.clone(), aggregate.clone());
        Ok(())
    }

    async fn save(&self, aggregate: &CompositeAggregate) -> Result<(), RepositoryError> {
        let mut aggregates = self.aggregates.write().map_err(poisoned)?;
        aggregates.insert(aggregate.id.clone(), aggregate.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &AggregateId,
    ) -> Result<Option<CompositeAggregate>, RepositoryError> {
        let aggregates = self.aggregates.read().map_err(poisoned)?;
        Ok(aggregates.get(id).cloned())
    }

    async fn delete(&self, id: &AggregateId) -> Result<bool, RepositoryError> {
        let mut aggregates = self.aggregates.write().map_err(poisoned)?;
        Ok(aggregates.remove(id).is_some())
    }
}

pub struct InMemoryTaskRepository<S, D> {
    tasks: Arc<RwLock<HashMap<TaskId, TaskState<S, D>>>>,
}

impl<S, D> InMemoryTaskRepository<S, D> {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<S, D> Default for InMemoryTaskRepository<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> Clone for InMemoryTaskRepository<S, D> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
        }
    }
}

#[async_trait]
impl<S, D> TaskRepository<S, D> for InMemoryTaskRepository<S, D>
where
    S: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    async fn save(&self, state: &TaskState<S, D>) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        tasks.insert(state.id, state.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<TaskState<S, D>>, RepositoryError> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        Ok(tasks.get(&id).cloned())
    }
}
