// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Allocation Workflow
//!
//! Provisions one downstream resource from a description and reports the
//! provisioned resource's link back through the task callback.
//!
//! ```text
//! CREATED ──provision ok──► COMPLETED   (result: {provisioned link})
//!    └─────provision err──► ERROR       (failure propagated untouched)
//! ```
//!
//! The provisioning request is correlated with its composite aggregate via
//! the composition context identifier found in the task's custom properties.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::task_engine::{StageOutcome, TaskWorkflow};
use crate::domain::link::LinkConventions;
use crate::domain::provisioning::{ProvisioningRequest, ResourceProvisioningService};
use crate::domain::task::{FailureKind, SubStage, TaskError, TaskFailure, TaskState};

/// Custom property holding the composition context identifier.
pub const COMPOSITION_CONTEXT_ID_PROPERTY: &str = "__composition_context_id";

/// Custom property holding the link of the owning composite aggregate.
pub const COMPOSITE_COMPONENT_LINK_PROPERTY: &str = "__composite_component_link";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationSubStage {
    Created,
    Completed,
    Error,
}

impl SubStage for AllocationSubStage {
    fn initial() -> Self {
        AllocationSubStage::Created
    }

    fn is_terminal(&self) -> bool {
        matches!(self, AllocationSubStage::Completed | AllocationSubStage::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationData {
    /// Description the resource is provisioned from
    pub resource_description_link: String,

    /// Captured once the provisioning request succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_resource_link: Option<String>,

    /// Result reported on completion: the provisioned link, or empty
    #[serde(default)]
    pub resource_links: BTreeSet<String>,
}

impl AllocationData {
    pub fn new(resource_description_link: impl Into<String>) -> Self {
        Self {
            resource_description_link: resource_description_link.into(),
            ..Default::default()
        }
    }
}

pub type AllocationState = TaskState<AllocationSubStage, AllocationData>;

pub struct AllocationWorkflow {
    provisioning: Arc<dyn ResourceProvisioningService>,
    links: LinkConventions,
}

impl AllocationWorkflow {
    pub fn new(provisioning: Arc<dyn ResourceProvisioningService>, links: LinkConventions) -> Self {
        Self { provisioning, links }
    }

    fn correlation_properties(&self, state: &AllocationState) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        if let Some(context_id) = state
            .custom_property(COMPOSITION_CONTEXT_ID_PROPERTY)
            .filter(|id| !id.is_empty())
        {
            properties.insert(COMPOSITION_CONTEXT_ID_PROPERTY.to_string(), context_id.to_string());
            properties.insert(
                COMPOSITE_COMPONENT_LINK_PROPERTY.to_string(),
                self.links.composite_component_link(context_id),
            );
        }
        properties
    }

    async fn provision(&self, state: &mut AllocationState) -> AllocationSubStage {
        let request = ProvisioningRequest {
            description_link: state.data.resource_description_link.clone(),
            custom_properties: self.correlation_properties(state),
            tenant_links: state.tenant_links.clone(),
        };

        match self.provisioning.create(request).await {
            Ok(resource) => {
                info!(task_id = %state.id, resource = %resource.link, "Resource provisioned");
                state.data.provisioned_resource_link = Some(resource.link);
                AllocationSubStage::Completed
            }
            Err(e) => {
                warn!(
                    task_id = %state.id,
                    description = %state.data.resource_description_link,
                    error = %e,
                    "Failed to provision resource"
                );
                state.record_failure(TaskFailure::new(
                    FailureKind::DependencyCreation,
                    e.to_string(),
                ));
                AllocationSubStage::Error
            }
        }
    }
}

#[async_trait]
impl TaskWorkflow for AllocationWorkflow {
    type SubStage = AllocationSubStage;
    type Data = AllocationData;

    fn display_name(&self) -> &'static str {
        "Allocation"
    }

    fn validate_on_start(&self, state: &AllocationState) -> Result<(), TaskError> {
        if state.data.resource_description_link.trim().is_empty() {
            return Err(TaskError::Validation(
                "resource_description_link is required".to_string(),
            ));
        }
        Ok(())
    }

    async fn handle_stage(
        &self,
        state: &mut AllocationState,
    ) -> Result<StageOutcome<AllocationSubStage>, TaskError> {
        match state.sub_stage {
            AllocationSubStage::Created => Ok(StageOutcome::ProceedTo(self.provision(state).await)),
            AllocationSubStage::Completed => {
                state.data.resource_links = match &state.data.provisioned_resource_link {
                    Some(link) => BTreeSet::from([link.clone()]),
                    None => {
                        warn!(
                            task_id = %state.id,
                            "No provisioned resource link captured, completing with no result links"
                        );
                        BTreeSet::new()
                    }
                };
                debug!(
                    task_id = %state.id,
                    links = ?state.data.resource_links,
                    "Allocation result assembled"
                );
                Ok(StageOutcome::Complete)
            }
            AllocationSubStage::Error => Ok(StageOutcome::Fail),
        }
    }

    fn finished_result(&self, state: &AllocationState) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "resource_links": state.data.resource_links }))
    }
}
