// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use provisioner_core::application::allocation::{
    AllocationData, AllocationSubStage, AllocationWorkflow, COMPOSITE_COMPONENT_LINK_PROPERTY,
    COMPOSITION_CONTEXT_ID_PROPERTY,
};
use provisioner_core::application::task_engine::{StartTaskRequest, TaskEngine, TaskPatchOutcome};
use provisioner_core::domain::events::TaskEvent;
use provisioner_core::domain::link::LinkConventions;
use provisioner_core::domain::provisioning::{ServiceError, TrackerRequest, TrackerService};
use provisioner_core::domain::task::{FailureKind, TaskCallback, TaskError, TaskStage};
use provisioner_core::infrastructure::event_bus::{DomainEvent, EventBus};
use provisioner_core::infrastructure::local::{
    InMemoryProvisioningService, InMemoryTrackerService, LoggingCallbackNotifier,
};
use provisioner_core::infrastructure::repositories::InMemoryTaskRepository;
use std::sync::Arc;

const DESCRIPTION: &str = "/resources/container-descriptions/web";

struct UnavailableTracker;

#[async_trait]
impl TrackerService for UnavailableTracker {
    async fn create(&self, _request: TrackerRequest) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("tracker offline".to_string()))
    }
}

struct Setup {
    engine: TaskEngine<AllocationWorkflow>,
    tracker: InMemoryTrackerService,
    provisioning: InMemoryProvisioningService,
    notifier: LoggingCallbackNotifier,
    event_bus: Arc<EventBus>,
}

fn setup(provisioning: InMemoryProvisioningService) -> Setup {
    let tracker = InMemoryTrackerService::new();
    let notifier = LoggingCallbackNotifier::new();
    let event_bus = Arc::new(EventBus::new(64));
    let workflow =
        AllocationWorkflow::new(Arc::new(provisioning.clone()), LinkConventions::default());
    let engine = TaskEngine::new(
        workflow,
        Arc::new(InMemoryTaskRepository::<AllocationSubStage, AllocationData>::new()),
        Arc::new(tracker.clone()),
        Arc::new(notifier.clone()),
        event_bus.clone(),
    );
    Setup {
        engine,
        tracker,
        provisioning,
        notifier,
        event_bus,
    }
}

fn request(context_id: &str) -> StartTaskRequest<AllocationData> {
    StartTaskRequest::new(AllocationData::new(DESCRIPTION))
        .with_custom_property(COMPOSITION_CONTEXT_ID_PROPERTY, context_id)
        .with_callback(TaskCallback::create("/requests/r-1", "ALLOCATED", "ERROR"))
}

#[tokio::test]
async fn test_allocation_completes_with_provisioned_link() {
    let s = setup(InMemoryProvisioningService::new("/resources/containers"));

    let started = s.engine.start(request("ctx-9")).await.unwrap();
    assert_eq!(s.tracker.requests().len(), 1);
    assert_eq!(s.tracker.requests()[0].tracked_tasks, vec!["Allocation".to_string()]);

    let stage = started.driver.await.unwrap().unwrap();
    assert_eq!(stage, TaskStage::Finished);

    let state = s.engine.get(started.id).await.unwrap();
    assert_eq!(state.sub_stage, AllocationSubStage::Completed);
    let provisioned = state.data.provisioned_resource_link.clone().unwrap();
    assert!(provisioned.starts_with("/resources/containers/"));
    assert_eq!(state.data.resource_links.len(), 1);
    assert!(state.data.resource_links.contains(&provisioned));

    let requests = s.provisioning.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].description_link, DESCRIPTION);
    assert_eq!(
        requests[0].custom_properties.get(COMPOSITE_COMPONENT_LINK_PROPERTY).map(String::as_str),
        Some("/resources/composite-components/ctx-9")
    );

    let delivered = s.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    let (callback, response) = &delivered[0];
    assert_eq!(callback.service_link.as_deref(), Some("/requests/r-1"));
    assert_eq!(response.task_stage, TaskStage::Finished);
    assert_eq!(response.sub_stage, "ALLOCATED");
    assert_eq!(
        response.result,
        Some(serde_json::json!({ "resource_links": [provisioned] }))
    );
}

#[tokio::test]
async fn test_explicit_tracker_creates_none() {
    let s = setup(InMemoryProvisioningService::new("/resources/containers"));

    let started = s
        .engine
        .start(request("ctx-1").with_tracker_link("/request-status/existing"))
        .await
        .unwrap();

    assert!(s.tracker.requests().is_empty());
    assert_eq!(started.request_tracker_link, "/request-status/existing");
    started.driver.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_provisioning_rejection_ends_in_error_with_cause() {
    let s = setup(InMemoryProvisioningService::rejecting("no capacity"));

    let started = s.engine.start(request("ctx-2")).await.unwrap();
    assert_eq!(started.driver.await.unwrap().unwrap(), TaskStage::Failed);

    let state = s.engine.get(started.id).await.unwrap();
    assert_eq!(state.sub_stage, AllocationSubStage::Error);
    let failure = state.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::DependencyCreation);

    let delivered = s.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1.task_stage, TaskStage::Failed);
    assert_eq!(delivered[0].1.sub_stage, "ERROR");
    assert_eq!(delivered[0].1.failure, Some(failure));
}

#[tokio::test]
async fn test_duplicate_terminal_patch_does_not_reprovision() {
    let s = setup(InMemoryProvisioningService::new("/resources/containers"));
    let started = s.engine.start(request("ctx-3")).await.unwrap();
    let id = started.id;
    started.driver.await.unwrap().unwrap();

    let outcome = s.engine.patch(id, AllocationSubStage::Completed).await.unwrap();
    assert!(matches!(outcome, TaskPatchOutcome::NotModified));
    assert_eq!(s.provisioning.requests().len(), 1);
    assert_eq!(s.notifier.delivered().len(), 1);
}

#[tokio::test]
async fn test_missing_description_fails_start() {
    let s = setup(InMemoryProvisioningService::new("/resources/containers"));

    let err = s
        .engine
        .start(StartTaskRequest::new(AllocationData::new("")))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Validation(_)));
    assert!(s.tracker.requests().is_empty());
    assert!(s.provisioning.requests().is_empty());
}

#[tokio::test]
async fn test_tracker_failure_fails_start() {
    let provisioning = InMemoryProvisioningService::new("/resources/containers");
    let engine = TaskEngine::new(
        AllocationWorkflow::new(Arc::new(provisioning.clone()), LinkConventions::default()),
        Arc::new(InMemoryTaskRepository::<AllocationSubStage, AllocationData>::new()),
        Arc::new(UnavailableTracker),
        Arc::new(LoggingCallbackNotifier::new()),
        Arc::new(EventBus::new(8)),
    );

    let err = engine.start(request("ctx-4")).await.unwrap_err();
    assert!(matches!(err, TaskError::DependencyCreation { .. }));
    assert!(provisioning.requests().is_empty());
}

#[tokio::test]
async fn test_task_events_follow_the_stages() {
    let s = setup(InMemoryProvisioningService::new("/resources/containers"));
    let mut events = s.event_bus.subscribe();

    let started = s.engine.start(request("ctx-5")).await.unwrap();
    started.driver.await.unwrap().unwrap();

    let mut seen = Vec::new();
    while let Ok(DomainEvent::Task(event)) = events.try_recv() {
        seen.push(match event {
            TaskEvent::TaskStarted { .. } => "started".to_string(),
            TaskEvent::TaskSubStageChanged { to, .. } => format!("to:{}", to),
            TaskEvent::TaskCompleted { .. } => "completed".to_string(),
            TaskEvent::TaskFailed { .. } => "failed".to_string(),
        });
    }
    assert_eq!(seen, vec!["started", "to:Completed", "completed"]);
}
