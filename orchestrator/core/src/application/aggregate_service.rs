// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Aggregate Lifecycle Application Service
//!
//! Owns create/replace/patch/delete of composite aggregates and the cascade
//! delete that removes an aggregate once its last owned component is gone.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Serialize mutations per aggregate, merge patches,
//!   schedule the post-commit cascade check
//! - **Collaborators:**
//!   - Domain: CompositeAggregate, LinkConventions
//!   - Infrastructure: AggregateRepository, DescriptionTemplateStore,
//!     NetworkQueryService, EventBus
//!
//! # Patch Flow
//!
//! 1. Merge the delta into the current state (signature before/after)
//! 2. Persist and answer the caller (`Applied` or `NotModified`)
//! 3. If links were removed, check the remainder in a background task:
//!    - empty remainder: cascade delete
//!    - networks only: fetch all of them, then cascade delete iff every one
//!      is externally managed
//!    - anything else: no cascade check

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::entity_locks::EntityLocks;
use crate::domain::aggregate::{
    AggregateDraft, AggregateError, AggregateId, AggregatePatch, CompositeAggregate, PatchMode,
};
use crate::domain::events::AggregateEvent;
use crate::domain::link::LinkConventions;
use crate::domain::network::{NetworkQueryService, NetworkSummary};
use crate::domain::provisioning::ServiceError;
use crate::domain::repository::{AggregateRepository, RepositoryError};
use crate::domain::template::{DeleteOutcome, DescriptionTemplateStore};
use crate::infrastructure::event_bus::EventBus;

/// Status of an acknowledged patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    Applied,
    /// The merge produced no semantic change
    NotModified,
}

/// Result of the background cascade check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// The aggregate was removed (or was already gone)
    Deleted,
    /// Some remaining networks are not externally managed
    Aborted { non_external_links: Vec<String> },
    /// The check or the self-delete could not complete
    Failed { reason: String },
}

#[derive(Debug)]
pub struct PatchResponse {
    pub status: PatchStatus,

    /// State as committed by this patch
    pub aggregate: CompositeAggregate,

    /// Handle of the spawned cascade check, if one was scheduled.
    /// Dropping it does not cancel the check.
    pub cascade: Option<JoinHandle<CascadeOutcome>>,
}

#[async_trait]
pub trait AggregateLifecycleService: Send + Sync {
    async fn create(&self, draft: AggregateDraft) -> Result<CompositeAggregate, AggregateError>;

    /// Overwrite an existing aggregate. Acknowledged without a body.
    async fn replace(&self, id: &AggregateId, draft: AggregateDraft) -> Result<(), AggregateError>;

    async fn patch(
        &self,
        id: &AggregateId,
        patch: AggregatePatch,
        mode: PatchMode,
    ) -> Result<PatchResponse, AggregateError>;

    async fn delete(&self, id: &AggregateId) -> Result<(), AggregateError>;

    async fn get(&self, id: &AggregateId) -> Result<CompositeAggregate, AggregateError>;

    /// Sample instance for schema discovery
    fn template(&self) -> CompositeAggregate;
}

pub struct StandardAggregateLifecycleService {
    repository: Arc<dyn AggregateRepository>,
    locks: EntityLocks<AggregateId>,
    event_bus: Arc<EventBus>,
    links: LinkConventions,
    cascade: CascadeDeleter,
}

impl StandardAggregateLifecycleService {
    pub fn new(
        repository: Arc<dyn AggregateRepository>,
        templates: Arc<dyn DescriptionTemplateStore>,
        networks: Arc<dyn NetworkQueryService>,
        event_bus: Arc<EventBus>,
        links: LinkConventions,
    ) -> Self {
        let locks = EntityLocks::new();
        let cascade = CascadeDeleter {
            repository: Arc::clone(&repository),
            templates,
            networks,
            locks: locks.clone(),
            event_bus: Arc::clone(&event_bus),
        };

        Self {
            repository,
            locks,
            event_bus,
            links,
            cascade,
        }
    }

    fn schedule_cascade(
        &self,
        aggregate: &CompositeAggregate,
        remainder: Vec<String>,
    ) -> Option<JoinHandle<CascadeOutcome>> {
        let deleter = self.cascade.clone();
        let aggregate = aggregate.clone();

        if remainder.is_empty() {
            debug!(
                aggregate_id = %aggregate.id,
                "No component links left, scheduling cascade delete"
            );
            return Some(tokio::spawn(deleter.delete_aggregate(aggregate)));
        }

        if remainder.iter().all(|link| self.links.is_network(link)) {
            debug!(
                aggregate_id = %aggregate.id,
                networks = remainder.len(),
                "Only network links left, checking whether they are externally managed"
            );
            return Some(tokio::spawn(deleter.delete_if_networks_external(aggregate, remainder)));
        }

        debug!(
            aggregate_id = %aggregate.id,
            remaining = remainder.len(),
            "Non-network component links remain, no cascade check"
        );
        None
    }
}

#[async_trait]
impl AggregateLifecycleService for StandardAggregateLifecycleService {
    async fn create(&self, draft: AggregateDraft) -> Result<CompositeAggregate, AggregateError> {
        let aggregate = CompositeAggregate::create(draft)?;
        let _guard = self.locks.acquire(&aggregate.id).await;

        self.repository.create(&aggregate).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AggregateError::AlreadyExists(aggregate.id.clone()),
            other => AggregateError::Repository(other),
        })?;

        info!(
            aggregate_id = %aggregate.id,
            name = %aggregate.name,
            components = aggregate.component_links.len(),
            "Composite aggregate created"
        );

        self.event_bus.publish_aggregate_event(AggregateEvent::AggregateCreated {
            aggregate_id: aggregate.id.clone(),
            name: aggregate.name.clone(),
            created_at: aggregate.created_at,
        });

        Ok(aggregate)
    }

    async fn replace(&self, id: &AggregateId, draft: AggregateDraft) -> Result<(), AggregateError> {
        let _guard = self.locks.acquire(id).await;

        let mut aggregate = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AggregateError::NotFound(id.clone()))?;

        aggregate.replace_with(draft)?;
        self.repository.save(&aggregate).await?;

        debug!(aggregate_id = %id, "Composite aggregate replaced");
        self.event_bus.publish_aggregate_event(AggregateEvent::AggregateReplaced {
            aggregate_id: id.clone(),
            replaced_at: Utc::now(),
        });

        Ok(())
    }

    async fn patch(
        &self,
        id: &AggregateId,
        patch: AggregatePatch,
        mode: PatchMode,
    ) -> Result<PatchResponse, AggregateError> {
        let (aggregate, outcome) = {
            let _guard = self.locks.acquire(id).await;

            let mut aggregate = self
                .repository
                .find_by_id(id)
                .await?
                .ok_or_else(|| AggregateError::NotFound(id.clone()))?;

            let outcome = aggregate.apply_patch(patch, mode)?;
            self.repository.save(&aggregate).await?;
            (aggregate, outcome)
        };

        let status = if outcome.modified {
            PatchStatus::Applied
        } else {
            debug!(aggregate_id = %id, "Patch left the content signature unchanged");
            PatchStatus::NotModified
        };

        self.event_bus.publish_aggregate_event(AggregateEvent::AggregatePatched {
            aggregate_id: id.clone(),
            modified: outcome.modified,
            patched_at: Utc::now(),
        });

        let cascade = outcome
            .remainder
            .and_then(|remainder| self.schedule_cascade(&aggregate, remainder));

        Ok(PatchResponse {
            status,
            aggregate,
            cascade,
        })
    }

    async fn delete(&self, id: &AggregateId) -> Result<(), AggregateError> {
        let removed = {
            let _guard = self.locks.acquire(id).await;
            self.repository.delete(id).await?
        };

        if !removed {
            return Err(AggregateError::NotFound(id.clone()));
        }

        self.locks.forget(id);
        info!(aggregate_id = %id, "Composite aggregate deleted");
        self.event_bus.publish_aggregate_event(AggregateEvent::AggregateDeleted {
            aggregate_id: id.clone(),
            deleted_at: Utc::now(),
        });

        Ok(())
    }

    async fn get(&self, id: &AggregateId) -> Result<CompositeAggregate, AggregateError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AggregateError::NotFound(id.clone()))
    }

    fn template(&self) -> CompositeAggregate {
        CompositeAggregate::document_template()
    }
}

/// Background half of the lifecycle service. Every failure ends up in the log;
/// there is no caller left to report to.
#[derive(Clone)]
struct CascadeDeleter {
    repository: Arc<dyn AggregateRepository>,
    templates: Arc<dyn DescriptionTemplateStore>,
    networks: Arc<dyn NetworkQueryService>,
    locks: EntityLocks<AggregateId>,
    event_bus: Arc<EventBus>,
}

impl CascadeDeleter {
    async fn delete_if_networks_external(
        self,
        aggregate: CompositeAggregate,
        network_links: Vec<String>,
    ) -> CascadeOutcome {
        let summaries = match self.fetch_networks(network_links).await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(
                    aggregate_id = %aggregate.id,
                    error = %e,
                    "Can't find container network states, keeping composite aggregate"
                );
                return CascadeOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        // Fold only after every fetch has completed.
        let all_external = summaries.iter().fold(true, |acc, network| acc && network.external);

        if all_external {
            return self.delete_aggregate(aggregate).await;
        }

        let non_external_links: Vec<String> = summaries
            .into_iter()
            .filter(|network| !network.external)
            .map(|network| network.link)
            .collect();

        warn!(
            aggregate_id = %aggregate.id,
            networks = ?non_external_links,
            "Non-external networks still associated to this composite aggregate"
        );
        self.event_bus.publish_aggregate_event(AggregateEvent::CascadeDeleteAborted {
            aggregate_id: aggregate.id.clone(),
            non_external_links: non_external_links.clone(),
            aborted_at: Utc::now(),
        });

        CascadeOutcome::Aborted { non_external_links }
    }

    async fn fetch_networks(
        &self,
        links: Vec<String>,
    ) -> Result<Vec<NetworkSummary>, ServiceError> {
        let stream = self.networks.list_by_links(links).await?;
        let results: Vec<Result<NetworkSummary, ServiceError>> = stream.collect().await;
        results.into_iter().collect()
    }

    async fn delete_aggregate(self, aggregate: CompositeAggregate) -> CascadeOutcome {
        info!(aggregate_id = %aggregate.id, "Cascade deleting composite aggregate");
        self.event_bus.publish_aggregate_event(AggregateEvent::CascadeDeleteTriggered {
            aggregate_id: aggregate.id.clone(),
            description_link: aggregate.description_link.clone(),
            triggered_at: Utc::now(),
        });

        let template_cleanup = async {
            if let Some(link) = aggregate.description_link.as_deref().filter(|l| !l.is_empty()) {
                self.delete_template_clone(link).await;
            }
        };

        let (_, outcome) = tokio::join!(template_cleanup, self.self_delete(&aggregate.id));
        outcome
    }

    async fn delete_template_clone(&self, link: &str) {
        let template = match self.templates.get(link).await {
            Ok(Some(template)) => template,
            Ok(None) | Err(ServiceError::NotFound(_)) => {
                debug!(description_link = %link, "Description template not found");
                return;
            }
            Err(e) => {
                warn!(description_link = %link, error = %e, "Can't find description template");
                return;
            }
        };

        if !template.is_clone() {
            debug!(description_link = %link, "Description template is shared, keeping it");
            return;
        }

        match self.templates.delete(&template.link).await {
            Ok(DeleteOutcome::Deleted) => {
                debug!(description_link = %template.link, "Description template deleted");
            }
            Ok(DeleteOutcome::NotFound) | Err(ServiceError::NotFound(_)) => {
                debug!(description_link = %template.link, "Description template already removed");
            }
            Err(e) => {
                warn!(
                    description_link = %template.link,
                    error = %e,
                    "Error deleting description template"
                );
            }
        }
    }

    async fn self_delete(&self, id: &AggregateId) -> CascadeOutcome {
        let result = {
            let _guard = self.locks.acquire(id).await;
            self.repository.delete(id).await
        };

        match result {
            Ok(removed) => {
                if removed {
                    self.event_bus.publish_aggregate_event(AggregateEvent::AggregateDeleted {
                        aggregate_id: id.clone(),
                        deleted_at: Utc::now(),
                    });
                } else {
                    debug!(aggregate_id = %id, "Composite aggregate already removed");
                }
                self.locks.forget(id);
                CascadeOutcome::Deleted
            }
            Err(e) => {
                error!(
                    aggregate_id = %id,
                    error = %e,
                    "Cascade delete of composite aggregate failed"
                );
                CascadeOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
