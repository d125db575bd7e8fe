// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local workflow demos
//!
//! Runs the aggregate lifecycle and allocation workflows against the
//! in-memory collaborators and prints what happened.
//!
//! Commands: allocate, cascade

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use provisioner_core::application::aggregate_service::{
    AggregateLifecycleService, CascadeOutcome, StandardAggregateLifecycleService,
};
use provisioner_core::application::allocation::{
    AllocationData, AllocationSubStage, AllocationWorkflow, COMPOSITION_CONTEXT_ID_PROPERTY,
};
use provisioner_core::application::task_engine::{StartTaskRequest, TaskEngine};
use provisioner_core::domain::aggregate::{AggregateDraft, AggregateId, AggregatePatch, PatchMode};
use provisioner_core::domain::config::OrchestratorConfig;
use provisioner_core::domain::link::build_path;
use provisioner_core::domain::task::TaskCallback;
use provisioner_core::domain::template::DescriptionTemplate;
use provisioner_core::infrastructure::event_bus::{DomainEvent, EventBus, EventReceiver};
use provisioner_core::infrastructure::local::{
    InMemoryNetworkDirectory, InMemoryProvisioningService, InMemoryTemplateStore,
    InMemoryTrackerService, LoggingCallbackNotifier,
};
use provisioner_core::infrastructure::repositories::{
    InMemoryAggregateRepository, InMemoryTaskRepository,
};

#[derive(Subcommand)]
pub enum DemoCommand {
    /// Run one allocation workflow to completion
    Allocate {
        /// Composition context identifier correlating the resource with its aggregate
        #[arg(long, value_name = "ID")]
        context_id: Option<String>,

        /// Link of the resource description to provision
        #[arg(long, value_name = "LINK")]
        description: String,

        /// Report to an existing tracker instead of creating one
        #[arg(long, value_name = "LINK")]
        tracker: Option<String>,

        /// Make the provisioning service reject the request with this reason
        #[arg(long, value_name = "REASON")]
        reject: Option<String>,
    },

    /// Remove an aggregate's components and watch the cascade delete
    Cascade {
        /// Register the aggregate's network as managed by the aggregate
        #[arg(long)]
        non_external: bool,
    },
}

pub async fn handle_command(command: DemoCommand, config: OrchestratorConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    match command {
        DemoCommand::Allocate {
            context_id,
            description,
            tracker,
            reject,
        } => allocate(config, context_id, description, tracker, reject).await,
        DemoCommand::Cascade { non_external } => cascade(config, non_external).await,
    }
}

async fn allocate(
    config: OrchestratorConfig,
    context_id: Option<String>,
    description: String,
    tracker_link: Option<String>,
    reject: Option<String>,
) -> Result<()> {
    let links = config.spec.links.clone();
    let event_bus = Arc::new(EventBus::new(config.spec.event_bus.capacity));
    let mut events = event_bus.subscribe();

    let provisioning = match reject {
        Some(reason) => InMemoryProvisioningService::rejecting(reason),
        None => InMemoryProvisioningService::new(links.containers.clone()),
    };
    let notifier = LoggingCallbackNotifier::new();

    let engine = TaskEngine::new(
        AllocationWorkflow::new(Arc::new(provisioning), links),
        Arc::new(InMemoryTaskRepository::<AllocationSubStage, AllocationData>::new()),
        Arc::new(InMemoryTrackerService::new()),
        Arc::new(notifier.clone()),
        event_bus.clone(),
    );

    let mut request = StartTaskRequest::new(AllocationData::new(description))
        .with_callback(TaskCallback::create("/requests/demo", "ALLOCATED", "ERROR"));
    if let Some(context_id) = context_id {
        request = request.with_custom_property(COMPOSITION_CONTEXT_ID_PROPERTY, context_id);
    }
    if let Some(link) = tracker_link {
        request = request.with_tracker_link(link);
    }

    let started = engine.start(request).await.context("Failed to start allocation")?;
    info!(task_id = %started.id, "Allocation started");
    println!("{} {}", "Task:".bold(), started.id);
    println!("{} {}", "Tracker:".bold(), started.request_tracker_link);

    let stage = started
        .driver
        .await
        .context("Allocation driver panicked")?
        .context("Allocation dispatch failed")?;

    let state = engine.get(started.id).await?;
    println!("{} {:?} / {:?}", "Stage:".bold(), stage, state.sub_stage);
    println!();
    println!("{}", "Final state:".bold());
    println!("{}", serde_json::to_string_pretty(&state)?);

    println!();
    println!("{}", "Callbacks delivered:".bold());
    for (callback, response) in notifier.delivered() {
        println!(
            "  {} -> {}",
            callback.service_link.as_deref().unwrap_or("(none)"),
            serde_json::to_string(&response)?
        );
    }

    print_events(&mut events);
    Ok(())
}

async fn cascade(config: OrchestratorConfig, non_external: bool) -> Result<()> {
    let links = config.spec.links.clone();
    let event_bus = Arc::new(EventBus::new(config.spec.event_bus.capacity));
    let mut events = event_bus.subscribe();

    let templates = InMemoryTemplateStore::new();
    let networks = InMemoryNetworkDirectory::new();
    let repository = Arc::new(InMemoryAggregateRepository::new());
    let service = StandardAggregateLifecycleService::new(
        repository.clone(),
        Arc::new(templates.clone()),
        Arc::new(networks.clone()),
        event_bus.clone(),
        links.clone(),
    );

    let context_id = uuid::Uuid::new_v4().to_string();
    let template_link = build_path(
        "/resources/composite-descriptions",
        &format!("{}-clone", context_id),
    );
    let container_link = build_path(&links.containers, "web-1");
    let network_link = build_path(&links.networks, "frontend");

    templates.insert(DescriptionTemplate {
        link: template_link.clone(),
        name: "web-stack".to_string(),
        parent_link: Some("/resources/composite-descriptions/web-stack".to_string()),
        components: Vec::new(),
    })?;
    networks.insert(network_link.clone(), !non_external)?;

    let aggregate = service
        .create(AggregateDraft {
            id: Some(AggregateId::from(context_id.as_str())),
            description_link: Some(template_link.clone()),
            component_links: vec![container_link.clone(), network_link.clone()],
            ..AggregateDraft::named("web-stack")
        })
        .await?;
    println!("{} {}", "Created aggregate:".bold(), aggregate.id);
    println!("  components: {:?}", aggregate.component_links);

    let response = service
        .patch(
            &aggregate.id,
            AggregatePatch::links([container_link.as_str()]),
            PatchMode::RemoveLinks,
        )
        .await?;
    println!(
        "{} {:?}, remaining {:?}",
        "Removed container:".bold(),
        response.status,
        response.aggregate.component_links
    );

    match response.cascade {
        Some(handle) => {
            let outcome = handle.await.context("Cascade task panicked")?;
            let line = match &outcome {
                CascadeOutcome::Deleted => "Cascade: aggregate deleted".green(),
                CascadeOutcome::Aborted { non_external_links } => format!(
                    "Cascade aborted, non-external networks: {:?}",
                    non_external_links
                )
                .yellow(),
                CascadeOutcome::Failed { reason } => format!("Cascade failed: {}", reason).red(),
            };
            println!("{}", line);
        }
        None => println!("{}", "No cascade check scheduled".dimmed()),
    }

    println!("  aggregate present: {}", service.get(&aggregate.id).await.is_ok());
    println!("  template clone present: {}", templates.contains(&template_link));

    print_events(&mut events);
    Ok(())
}

fn print_events(events: &mut EventReceiver) {
    println!();
    println!("{}", "Events:".bold());
    while let Ok(event) = events.try_recv() {
        let line = match &event {
            DomainEvent::Aggregate(event) => format!("{:?}", event),
            DomainEvent::Task(event) => format!("{:?}", event),
        };
        println!("  {}", line.dimmed());
    }
}
