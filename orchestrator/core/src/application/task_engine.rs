// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Generic Task Workflow Engine
//!
//! Drives a [`TaskWorkflow`] through its sub-stages. The engine owns the
//! parts every workflow shares:
//!
//! - start-time validation and tracker bootstrapping
//! - per-task serialization of dispatch steps
//! - monotonic sub-stage transitions
//! - the terminal action (stage flip, event, callback notification)
//!
//! A workflow only decides, per sub-stage, where the task goes next.
//!
//! # Start Sequence
//!
//! ```text
//! start(request)
//!   ├─ workflow.validate_on_start()      (rejects before anything is persisted)
//!   ├─ tracker.create()                  (only when no tracker link was given)
//!   ├─ persist stage=Started
//!   └─ spawn driver ──► dispatch(initial) ─► dispatch(next) ─► ... ─► terminal
//! ```

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::application::entity_locks::EntityLocks;
use crate::domain::events::TaskEvent;
use crate::domain::provisioning::{TaskCallbackNotifier, TrackerRequest, TrackerService};
use crate::domain::repository::TaskRepository;
use crate::domain::task::{
    CallbackResponse, SubStage, TaskCallback, TaskError, TaskId, TaskStage, TaskState,
};
use crate::infrastructure::event_bus::EventBus;

/// What a stage handler decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome<S> {
    /// Persist the transition and dispatch the next sub-stage
    ProceedTo(S),
    /// Terminal success: notify the "finished" callback
    Complete,
    /// Terminal failure: notify the "failed" callback with the recorded failure
    Fail,
}

#[async_trait]
pub trait TaskWorkflow: Send + Sync + 'static {
    type SubStage: SubStage;
    type Data: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Name reported to the tracker and in events
    fn display_name(&self) -> &'static str;

    fn validate_on_start(
        &self,
        _state: &TaskState<Self::SubStage, Self::Data>,
    ) -> Result<(), TaskError> {
        Ok(())
    }

    /// Run the logic of `state.sub_stage`. Mutations to `state` are persisted
    /// together with the returned transition.
    async fn handle_stage(
        &self,
        state: &mut TaskState<Self::SubStage, Self::Data>,
    ) -> Result<StageOutcome<Self::SubStage>, TaskError>;

    /// Workflow result attached to the "finished" callback response
    fn finished_result(
        &self,
        _state: &TaskState<Self::SubStage, Self::Data>,
    ) -> Option<serde_json::Value> {
        None
    }
}

/// Body of a start request.
#[derive(Debug, Clone)]
pub struct StartTaskRequest<D> {
    pub data: D,
    pub custom_properties: HashMap<String, String>,
    pub tenant_links: Vec<String>,
    pub callback: TaskCallback,

    /// Existing tracker to report to. When absent one is created on start.
    pub request_tracker_link: Option<String>,
}

impl<D> StartTaskRequest<D> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            custom_properties: HashMap::new(),
            tenant_links: Vec::new(),
            callback: TaskCallback::empty(),
            request_tracker_link: None,
        }
    }

    pub fn with_custom_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_callback(mut self, callback: TaskCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_tracker_link(mut self, link: impl Into<String>) -> Self {
        self.request_tracker_link = Some(link.into());
        self
    }
}

/// Dispatch loop of a task; resolves to the stage it stopped at.
pub type DriverHandle = JoinHandle<Result<TaskStage, TaskError>>;

#[derive(Debug)]
pub struct StartedTask {
    pub id: TaskId,
    pub request_tracker_link: String,

    /// Background dispatch loop. Dropping it does not stop the task.
    pub driver: DriverHandle,
}

#[derive(Debug)]
pub enum TaskPatchOutcome {
    /// The task was moved to the requested sub-stage and is being dispatched
    Accepted { driver: DriverHandle },
    /// The task already finished or failed
    NotModified,
}

enum Step<S> {
    Continue(S),
    Stopped(TaskStage),
}

pub struct TaskEngine<W: TaskWorkflow> {
    workflow: Arc<W>,
    repository: Arc<dyn TaskRepository<W::SubStage, W::Data>>,
    tracker: Arc<dyn TrackerService>,
    notifier: Arc<dyn TaskCallbackNotifier>,
    event_bus: Arc<EventBus>,
    locks: EntityLocks<TaskId>,
}

impl<W: TaskWorkflow> Clone for TaskEngine<W> {
    fn clone(&self) -> Self {
        Self {
            workflow: Arc::clone(&self.workflow),
            repository: Arc::clone(&self.repository),
            tracker: Arc::clone(&self.tracker),
            notifier: Arc::clone(&self.notifier),
            event_bus: Arc::clone(&self.event_bus),
            locks: self.locks.clone(),
        }
    }
}

impl<W: TaskWorkflow> TaskEngine<W> {
    pub fn new(
        workflow: W,
        repository: Arc<dyn TaskRepository<W::SubStage, W::Data>>,
        tracker: Arc<dyn TrackerService>,
        notifier: Arc<dyn TaskCallbackNotifier>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            workflow: Arc::new(workflow),
            repository,
            tracker,
            notifier,
            event_bus,
            locks: EntityLocks::new(),
        }
    }

    /// Validate, bootstrap the tracker and begin dispatch.
    ///
    /// Fails without persisting anything if validation or tracker creation
    /// fails.
    pub async fn start(
        &self,
        request: StartTaskRequest<W::Data>,
    ) -> Result<StartedTask, TaskError> {
        let mut state: TaskState<W::SubStage, W::Data> = TaskState::new(request.data);
        state.custom_properties = request.custom_properties;
        state.tenant_links = request.tenant_links;
        state.callback = request.callback;

        self.workflow.validate_on_start(&state)?;

        let tracker_link = match request.request_tracker_link.filter(|link| !link.is_empty()) {
            Some(link) => link,
            None => self.create_tracker(&state).await?,
        };

        state.request_tracker_link = Some(tracker_link.clone());
        state.stage = TaskStage::Started;
        state.updated_at = Utc::now();
        self.repository.save(&state).await?;

        info!(
            task_id = %state.id,
            workflow = self.workflow.display_name(),
            tracker = %tracker_link,
            "Task started"
        );
        self.event_bus.publish_task_event(TaskEvent::TaskStarted {
            task_id: state.id,
            workflow: self.workflow.display_name().to_string(),
            request_tracker_link: Some(tracker_link.clone()),
            started_at: Utc::now(),
        });

        let driver = self.spawn_driver(state.id, state.sub_stage);

        Ok(StartedTask {
            id: state.id,
            request_tracker_link: tracker_link,
            driver,
        })
    }

    /// Move a task forward to `sub_stage` and dispatch it.
    ///
    /// Patching the current sub-stage re-drives it; patching an earlier one is
    /// an illegal transition.
    pub async fn patch(
        &self,
        id: TaskId,
        sub_stage: W::SubStage,
    ) -> Result<TaskPatchOutcome, TaskError> {
        match self.accept_patch(id, sub_stage).await {
            Ok(true) => Ok(TaskPatchOutcome::Accepted {
                driver: self.spawn_driver(id, sub_stage),
            }),
            Ok(false) => {
                self.locks.forget(&id);
                Ok(TaskPatchOutcome::NotModified)
            }
            Err(e) => {
                self.locks.forget(&id);
                Err(e)
            }
        }
    }

    /// Apply a patch under the task's lock. `Ok(false)` means not modified.
    async fn accept_patch(&self, id: TaskId, sub_stage: W::SubStage) -> Result<bool, TaskError> {
        let _guard = self.locks.acquire(&id).await;
        let mut state = self.load(id).await?;

        if state.stage.is_terminal() {
            debug!(
                task_id = %id,
                sub_stage = ?sub_stage,
                "Task already terminal, ignoring patch"
            );
            return Ok(false);
        }

        let leaves_terminal = state.sub_stage.is_terminal() && sub_stage != state.sub_stage;
        if sub_stage < state.sub_stage || leaves_terminal {
            return Err(TaskError::IllegalTransition {
                task_id: id,
                from: format!("{:?}", state.sub_stage),
                to: format!("{:?}", sub_stage),
            });
        }

        if sub_stage > state.sub_stage {
            self.transition(&mut state, sub_stage).await?;
        } else {
            info!(
                task_id = %id,
                sub_stage = ?sub_stage,
                "Re-driving task in its current sub-stage"
            );
        }
        Ok(true)
    }

    pub async fn get(&self, id: TaskId) -> Result<TaskState<W::SubStage, W::Data>, TaskError> {
        self.load(id).await
    }

    async fn create_tracker(
        &self,
        state: &TaskState<W::SubStage, W::Data>,
    ) -> Result<String, TaskError> {
        let request = TrackerRequest {
            task_id: state.id,
            tracked_tasks: vec![self.workflow.display_name().to_string()],
            custom_properties: state.custom_properties.clone(),
            tenant_links: state.tenant_links.clone(),
        };

        self.tracker.create(request).await.map_err(|source| {
            error!(task_id = %state.id, error = %source, "Failed to create request tracker");
            TaskError::DependencyCreation {
                entity: "request tracker",
                source,
            }
        })
    }

    async fn load(&self, id: TaskId) -> Result<TaskState<W::SubStage, W::Data>, TaskError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(TaskError::NotFound(id))
    }

    fn spawn_driver(&self, id: TaskId, sub_stage: W::SubStage) -> DriverHandle {
        let engine = self.clone();
        tokio::spawn(async move { engine.drive(id, sub_stage).await })
    }

    async fn drive(self, id: TaskId, mut sub_stage: W::SubStage) -> Result<TaskStage, TaskError> {
        let result = loop {
            match self.dispatch(id, sub_stage).await {
                Ok(Step::Continue(next)) => sub_stage = next,
                Ok(Step::Stopped(stage)) => break Ok(stage),
                Err(e) => {
                    error!(
                        task_id = %id,
                        sub_stage = ?sub_stage,
                        error = %e,
                        "Task dispatch failed"
                    );
                    break Err(e);
                }
            }
        };

        // Entries still held by a concurrent patch or driver stay.
        self.locks.forget(&id);
        result
    }

    /// One dispatch step, executed while holding the task's lock.
    async fn dispatch(
        &self,
        id: TaskId,
        sub_stage: W::SubStage,
    ) -> Result<Step<W::SubStage>, TaskError> {
        let _guard = self.locks.acquire(&id).await;
        let mut state = self.load(id).await?;

        if state.stage.is_terminal() {
            debug!(
                task_id = %id,
                sub_stage = ?sub_stage,
                "Duplicate dispatch of a terminal task ignored"
            );
            return Ok(Step::Stopped(state.stage));
        }

        if state.sub_stage != sub_stage {
            debug!(
                task_id = %id,
                expected = ?sub_stage,
                actual = ?state.sub_stage,
                "Stale dispatch ignored"
            );
            return Ok(Step::Stopped(state.stage));
        }

        // Handler failures leave the persisted state untouched.
        let outcome = self.workflow.handle_stage(&mut state).await?;

        match outcome {
            StageOutcome::ProceedTo(next) => {
                if next <= state.sub_stage || state.sub_stage.is_terminal() {
                    return Err(TaskError::IllegalTransition {
                        task_id: id,
                        from: format!("{:?}", state.sub_stage),
                        to: format!("{:?}", next),
                    });
                }
                self.transition(&mut state, next).await?;
                Ok(Step::Continue(next))
            }
            StageOutcome::Complete => self.finish(state).await.map(Step::Stopped),
            StageOutcome::Fail => self.fail(state).await.map(Step::Stopped),
        }
    }

    async fn transition(
        &self,
        state: &mut TaskState<W::SubStage, W::Data>,
        next: W::SubStage,
    ) -> Result<(), TaskError> {
        let from = state.sub_stage;
        state.sub_stage = next;
        state.updated_at = Utc::now();
        self.repository.save(state).await?;

        info!(task_id = %state.id, from = ?from, to = ?next, "Task sub-stage changed");
        self.event_bus.publish_task_event(TaskEvent::TaskSubStageChanged {
            task_id: state.id,
            from: format!("{:?}", from),
            to: format!("{:?}", next),
            changed_at: state.updated_at,
        });
        Ok(())
    }

    async fn finish(
        &self,
        mut state: TaskState<W::SubStage, W::Data>,
    ) -> Result<TaskStage, TaskError> {
        state.stage = TaskStage::Finished;
        state.updated_at = Utc::now();
        self.repository.save(&state).await?;

        let result = self.workflow.finished_result(&state);
        info!(task_id = %state.id, sub_stage = ?state.sub_stage, "Task completed");
        self.event_bus.publish_task_event(TaskEvent::TaskCompleted {
            task_id: state.id,
            result: result.clone(),
            completed_at: state.updated_at,
        });

        let mut response = state.callback.finished_response(state.id);
        response.custom_properties = state.custom_properties.clone();
        response.result = result;
        self.notify(&state.callback, state.id, response).await?;

        Ok(TaskStage::Finished)
    }

    async fn fail(
        &self,
        mut state: TaskState<W::SubStage, W::Data>,
    ) -> Result<TaskStage, TaskError> {
        state.stage = TaskStage::Failed;
        state.updated_at = Utc::now();
        self.repository.save(&state).await?;

        info!(
            task_id = %state.id,
            sub_stage = ?state.sub_stage,
            failure = ?state.failure,
            "Task failed"
        );
        self.event_bus.publish_task_event(TaskEvent::TaskFailed {
            task_id: state.id,
            failure: state.failure.clone(),
            failed_at: state.updated_at,
        });

        let mut response = state.callback.failed_response(state.id, state.failure.clone());
        response.custom_properties = state.custom_properties.clone();
        self.notify(&state.callback, state.id, response).await?;

        Ok(TaskStage::Failed)
    }

    async fn notify(
        &self,
        callback: &TaskCallback,
        task_id: TaskId,
        response: CallbackResponse,
    ) -> Result<(), TaskError> {
        if callback.is_empty() {
            debug!(task_id = %task_id, "No callback configured, skipping notification");
            return Ok(());
        }

        self.notifier.notify(callback, response).await.map_err(|e| {
            error!(task_id = %task_id, error = %e, "Failed to notify task callback");
            TaskError::Notification(e)
        })
    }
}
