// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process collaborator adapters.
//!
//! Stand-ins for the remote template, network, tracker, provisioning and
//! callback services. Used by the CLI demos and by tests that want real
//! behavior instead of scripted mocks.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::link::build_path;
use crate::domain::network::{NetworkQueryService, NetworkSummary};
use crate::domain::provisioning::{
    ProvisionedResource, ProvisioningRequest, ResourceProvisioningService, ServiceError,
    TaskCallbackNotifier, TrackerRequest, TrackerService,
};
use crate::domain::task::{CallbackResponse, TaskCallback};
use crate::domain::template::{DeleteOutcome, DescriptionTemplate, DescriptionTemplateStore};

/// Tracker links are created under this prefix.
pub const REQUEST_STATUS_PREFIX: &str = "/request-status";

fn poisoned<E>(_: E) -> ServiceError {
    ServiceError::Unavailable("in-memory collaborator lock poisoned".to_string())
}

#[derive(Clone, Default)]
pub struct InMemoryTemplateStore {
    templates: Arc<RwLock<HashMap<String, DescriptionTemplate>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: DescriptionTemplate) -> Result<(), ServiceError> {
        let mut templates = self.templates.write().map_err(poisoned)?;
        templates.insert(template.link.clone(), template);
        Ok(())
    }

    pub fn contains(&self, link: &str) -> bool {
        self.templates
            .read()
            .map(|templates| templates.contains_key(link))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DescriptionTemplateStore for InMemoryTemplateStore {
    async fn get(&self, link: &str) -> Result<Option<DescriptionTemplate>, ServiceError> {
        let templates = self.templates.read().map_err(poisoned)?;
        Ok(templates.get(link).cloned())
    }

    async fn delete(&self, link: &str) -> Result<DeleteOutcome, ServiceError> {
        let mut templates = self.templates.write().map_err(poisoned)?;
        match templates.remove(link) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNetworkDirectory {
    networks: Arc<RwLock<HashMap<String, NetworkSummary>>>,
}

impl InMemoryNetworkDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, link: impl Into<String>, external: bool) -> Result<(), ServiceError> {
        let link = link.into();
        let mut networks = self.networks.write().map_err(poisoned)?;
        networks.insert(link.clone(), NetworkSummary { link, external });
        Ok(())
    }
}

#[async_trait]
impl NetworkQueryService for InMemoryNetworkDirectory {
    async fn list_by_links(
        &self,
        links: Vec<String>,
    ) -> Result<BoxStream<'static, Result<NetworkSummary, ServiceError>>, ServiceError> {
        let networks = self.networks.read().map_err(poisoned)?;
        let found: Vec<Result<NetworkSummary, ServiceError>> = links
            .iter()
            .filter_map(|link| networks.get(link).cloned())
            .map(Ok)
            .collect();

        debug!(requested = links.len(), found = found.len(), "Listing container networks");
        Ok(stream::iter(found).boxed())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTrackerService {
    requests: Arc<Mutex<Vec<TrackerRequest>>>,
}

impl InMemoryTrackerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker requests received so far
    pub fn requests(&self) -> Vec<TrackerRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TrackerService for InMemoryTrackerService {
    async fn create(&self, request: TrackerRequest) -> Result<String, ServiceError> {
        let link = build_path(REQUEST_STATUS_PREFIX, &request.task_id.to_string());
        debug!(tracker = %link, tracked = ?request.tracked_tasks, "Request tracker created");
        self.requests.lock().map_err(poisoned)?.push(request);
        Ok(link)
    }
}

/// Provisions resources under a fixed link prefix, or rejects every request
/// when built with [`InMemoryProvisioningService::rejecting`].
#[derive(Clone)]
pub struct InMemoryProvisioningService {
    resource_prefix: String,
    rejection: Option<String>,
    requests: Arc<Mutex<Vec<ProvisioningRequest>>>,
}

impl InMemoryProvisioningService {
    pub fn new(resource_prefix: impl Into<String>) -> Self {
        Self {
            resource_prefix: resource_prefix.into(),
            rejection: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            rejection: Some(reason.into()),
            ..Self::new("")
        }
    }

    pub fn requests(&self) -> Vec<ProvisioningRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResourceProvisioningService for InMemoryProvisioningService {
    async fn create(
        &self,
        request: ProvisioningRequest,
    ) -> Result<ProvisionedResource, ServiceError> {
        self.requests.lock().map_err(poisoned)?.push(request);

        if let Some(reason) = &self.rejection {
            return Err(ServiceError::Rejected(reason.clone()));
        }

        let link = build_path(&self.resource_prefix, &Uuid::new_v4().to_string());
        Ok(ProvisionedResource { link })
    }
}

/// Logs every callback response and keeps it for inspection.
#[derive(Clone, Default)]
pub struct LoggingCallbackNotifier {
    delivered: Arc<Mutex<Vec<(TaskCallback, CallbackResponse)>>>,
}

impl LoggingCallbackNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(TaskCallback, CallbackResponse)> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TaskCallbackNotifier for LoggingCallbackNotifier {
    async fn notify(
        &self,
        callback: &TaskCallback,
        response: CallbackResponse,
    ) -> Result<(), ServiceError> {
        info!(
            target_link = ?callback.service_link,
            task_id = %response.task_id,
            task_stage = ?response.task_stage,
            sub_stage = %response.sub_stage,
            "Task callback delivered"
        );
        self.delivered
            .lock()
            .map_err(poisoned)?
            .push((callback.clone(), response));
        Ok(())
    }
}
