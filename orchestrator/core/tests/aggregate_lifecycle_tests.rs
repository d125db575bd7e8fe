// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use provisioner_core::application::aggregate_service::{
    AggregateLifecycleService, CascadeOutcome, PatchStatus, StandardAggregateLifecycleService,
};
use provisioner_core::domain::aggregate::{
    AggregateDraft, AggregateError, AggregateId, AggregatePatch, PatchMode,
};
use provisioner_core::domain::events::AggregateEvent;
use provisioner_core::domain::link::LinkConventions;
use provisioner_core::domain::network::{NetworkQueryService, NetworkSummary};
use provisioner_core::domain::provisioning::ServiceError;
use provisioner_core::domain::repository::AggregateRepository;
use provisioner_core::domain::template::{
    DeleteOutcome, DescriptionTemplate, DescriptionTemplateStore,
};
use provisioner_core::infrastructure::event_bus::{DomainEvent, EventBus};
use provisioner_core::infrastructure::repositories::InMemoryAggregateRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const CONTAINER_1: &str = "/resources/containers/c1";
const CONTAINER_2: &str = "/resources/containers/c2";
const NETWORK_1: &str = "/resources/container-networks/n1";
const NETWORK_2: &str = "/resources/container-networks/n2";
const TEMPLATE: &str = "/resources/composite-descriptions/t1-clone";
const PARENT_TEMPLATE: &str = "/resources/composite-descriptions/t1";

/// Template store that records lookups and deletes.
#[derive(Default)]
struct RecordingTemplateStore {
    templates: Mutex<HashMap<String, DescriptionTemplate>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingTemplateStore {
    fn with(templates: Vec<DescriptionTemplate>) -> Self {
        let store = Self::default();
        {
            let mut map = store.templates.lock().unwrap();
            for template in templates {
                map.insert(template.link.clone(), template);
            }
        }
        store
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DescriptionTemplateStore for RecordingTemplateStore {
    async fn get(&self, link: &str) -> Result<Option<DescriptionTemplate>, ServiceError> {
        Ok(self.templates.lock().unwrap().get(link).cloned())
    }

    async fn delete(&self, link: &str) -> Result<DeleteOutcome, ServiceError> {
        self.deleted.lock().unwrap().push(link.to_string());
        match self.templates.lock().unwrap().remove(link) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}

/// Network service answering from a fixed table; optionally fails the query.
#[derive(Default)]
struct ScriptedNetworks {
    external: HashMap<String, bool>,
    failing_item: Option<String>,
    queries: Mutex<Vec<Vec<String>>>,
}

impl ScriptedNetworks {
    fn with(entries: &[(&str, bool)]) -> Self {
        Self {
            external: entries.iter().map(|(l, e)| (l.to_string(), *e)).collect(),
            ..Default::default()
        }
    }

    fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl NetworkQueryService for ScriptedNetworks {
    async fn list_by_links(
        &self,
        links: Vec<String>,
    ) -> Result<BoxStream<'static, Result<NetworkSummary, ServiceError>>, ServiceError> {
        self.queries.lock().unwrap().push(links.clone());

        let items: Vec<Result<NetworkSummary, ServiceError>> = links
            .into_iter()
            .map(|link| {
                if self.failing_item.as_deref() == Some(link.as_str()) {
                    return Err(ServiceError::Unavailable(format!("cannot load {}", link)));
                }
                let external = self.external.get(&link).copied().unwrap_or(false);
                Ok(NetworkSummary { link, external })
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

struct Harness {
    service: StandardAggregateLifecycleService,
    repository: Arc<InMemoryAggregateRepository>,
    templates: Arc<RecordingTemplateStore>,
    networks: Arc<ScriptedNetworks>,
    event_bus: Arc<EventBus>,
}

fn harness(templates: RecordingTemplateStore, networks: ScriptedNetworks) -> Harness {
    let repository = Arc::new(InMemoryAggregateRepository::new());
    let templates = Arc::new(templates);
    let networks = Arc::new(networks);
    let event_bus = Arc::new(EventBus::new(64));
    let service = StandardAggregateLifecycleService::new(
        repository.clone(),
        templates.clone(),
        networks.clone(),
        event_bus.clone(),
        LinkConventions::default(),
    );
    Harness {
        service,
        repository,
        templates,
        networks,
        event_bus,
    }
}

fn clone_template() -> DescriptionTemplate {
    DescriptionTemplate {
        link: TEMPLATE.to_string(),
        name: "t1".to_string(),
        parent_link: Some(PARENT_TEMPLATE.to_string()),
        components: Vec::new(),
    }
}

fn draft(links: &[&str]) -> AggregateDraft {
    AggregateDraft {
        component_links: links.iter().map(|l| l.to_string()).collect(),
        ..AggregateDraft::named("app1")
    }
}

#[tokio::test]
async fn test_create_persists_with_empty_links_and_timestamp() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let before = chrono::Utc::now();

    let created = h.service.create(AggregateDraft::named("app1")).await.unwrap();

    assert!(created.component_links.is_empty());
    assert!(created.created_at >= before);
    let stored = h.repository.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn test_create_without_name_is_rejected() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let err = h.service.create(AggregateDraft::default()).await.unwrap_err();
    assert!(matches!(err, AggregateError::Validation(_)));
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn test_create_with_taken_identity_is_rejected() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let requested = AggregateDraft {
        id: Some(AggregateId::from("ctx-1")),
        ..AggregateDraft::named("app1")
    };

    h.service.create(requested.clone()).await.unwrap();
    let err = h.service.create(requested).await.unwrap_err();
    assert!(matches!(err, AggregateError::AlreadyExists(id) if id.as_str() == "ctx-1"));
}

#[tokio::test]
async fn test_patch_merges_links_in_first_seen_order() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let created = h.service.create(draft(&[CONTAINER_1])).await.unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_2, CONTAINER_1]), PatchMode::Merge)
        .await
        .unwrap();

    assert_eq!(response.status, PatchStatus::Applied);
    assert_eq!(response.aggregate.component_links, vec![CONTAINER_1, CONTAINER_2]);
    assert!(response.cascade.is_none());
}

#[tokio::test]
async fn test_identical_patch_is_not_modified() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let created = h.service.create(draft(&[CONTAINER_1])).await.unwrap();

    let patch = AggregatePatch {
        name: Some("app1".to_string()),
        component_links: Some(vec![CONTAINER_1.to_string()]),
        ..Default::default()
    };
    let response = h.service.patch(&created.id, patch, PatchMode::Merge).await.unwrap();

    assert_eq!(response.status, PatchStatus::NotModified);
    assert_eq!(h.service.get(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn test_removing_container_with_container_remainder_skips_cascade_check() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let created = h.service.create(draft(&[CONTAINER_1, CONTAINER_2])).await.unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    assert_eq!(response.status, PatchStatus::Applied);
    assert_eq!(response.aggregate.component_links, vec![CONTAINER_2]);
    assert!(response.cascade.is_none());
    assert_eq!(h.networks.query_count(), 0);
    assert!(h.service.get(&created.id).await.is_ok());
}

#[tokio::test]
async fn test_removing_last_link_cascade_deletes_aggregate_and_template_clone() {
    let h = harness(
        RecordingTemplateStore::with(vec![clone_template()]),
        ScriptedNetworks::default(),
    );
    let created = h
        .service
        .create(AggregateDraft {
            description_link: Some(TEMPLATE.to_string()),
            ..draft(&[CONTAINER_2])
        })
        .await
        .unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_2]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    let outcome = response.cascade.expect("cascade scheduled").await.unwrap();
    assert_eq!(outcome, CascadeOutcome::Deleted);
    assert_eq!(h.templates.deleted(), vec![TEMPLATE.to_string()]);
    assert!(matches!(
        h.service.get(&created.id).await,
        Err(AggregateError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cascade_keeps_shared_template() {
    let shared = DescriptionTemplate {
        parent_link: None,
        ..clone_template()
    };
    let h = harness(RecordingTemplateStore::with(vec![shared]), ScriptedNetworks::default());
    let created = h
        .service
        .create(AggregateDraft {
            description_link: Some(TEMPLATE.to_string()),
            ..draft(&[CONTAINER_1])
        })
        .await
        .unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    assert_eq!(response.cascade.unwrap().await.unwrap(), CascadeOutcome::Deleted);
    assert!(h.templates.deleted().is_empty());
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn test_cascade_tolerates_missing_template() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let created = h
        .service
        .create(AggregateDraft {
            description_link: Some(TEMPLATE.to_string()),
            ..draft(&[CONTAINER_1])
        })
        .await
        .unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    assert_eq!(response.cascade.unwrap().await.unwrap(), CascadeOutcome::Deleted);
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn test_external_network_remainder_cascade_deletes() {
    let h = harness(
        RecordingTemplateStore::default(),
        ScriptedNetworks::with(&[(NETWORK_1, true), (NETWORK_2, true)]),
    );
    let created = h
        .service
        .create(draft(&[CONTAINER_1, NETWORK_1, NETWORK_2]))
        .await
        .unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    assert_eq!(response.cascade.unwrap().await.unwrap(), CascadeOutcome::Deleted);
    assert_eq!(h.networks.query_count(), 1);
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn test_non_external_network_aborts_cascade_with_warning_event() {
    let h = harness(
        RecordingTemplateStore::default(),
        ScriptedNetworks::with(&[(NETWORK_1, true), (NETWORK_2, false)]),
    );
    let created = h
        .service
        .create(draft(&[CONTAINER_1, NETWORK_1, NETWORK_2]))
        .await
        .unwrap();
    let mut events = h.event_bus.subscribe_aggregate(created.id.clone());

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    let outcome = response.cascade.unwrap().await.unwrap();
    assert_eq!(
        outcome,
        CascadeOutcome::Aborted {
            non_external_links: vec![NETWORK_2.to_string()]
        }
    );

    let survivor = h.service.get(&created.id).await.unwrap();
    assert_eq!(survivor.component_links, vec![NETWORK_1, NETWORK_2]);

    let mut aborted = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(100), events.recv()).await
    {
        if let AggregateEvent::CascadeDeleteAborted { non_external_links, .. } = event {
            assert_eq!(non_external_links, vec![NETWORK_2.to_string()]);
            aborted = true;
            break;
        }
    }
    assert!(aborted, "expected a CascadeDeleteAborted event");
}

#[tokio::test]
async fn test_network_query_failure_keeps_aggregate() {
    let networks = ScriptedNetworks {
        failing_item: Some(NETWORK_1.to_string()),
        ..ScriptedNetworks::with(&[(NETWORK_2, true)])
    };
    let h = harness(RecordingTemplateStore::default(), networks);
    let created = h
        .service
        .create(draft(&[CONTAINER_1, NETWORK_1, NETWORK_2]))
        .await
        .unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    assert!(matches!(
        response.cascade.unwrap().await.unwrap(),
        CascadeOutcome::Failed { .. }
    ));
    assert!(h.service.get(&created.id).await.is_ok());
}

#[tokio::test]
async fn test_mixed_remainder_skips_cascade_check() {
    let h = harness(
        RecordingTemplateStore::default(),
        ScriptedNetworks::with(&[(NETWORK_1, true)]),
    );
    let created = h
        .service
        .create(draft(&[CONTAINER_1, CONTAINER_2, NETWORK_1]))
        .await
        .unwrap();

    let response = h
        .service
        .patch(&created.id, AggregatePatch::links([CONTAINER_1]), PatchMode::RemoveLinks)
        .await
        .unwrap();

    assert!(response.cascade.is_none());
    assert_eq!(h.networks.query_count(), 0);
}

#[tokio::test]
async fn test_replace_keeps_identity_and_creation_time() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let created = h.service.create(draft(&[CONTAINER_1])).await.unwrap();

    h.service
        .replace(&created.id, AggregateDraft::named("app2"))
        .await
        .unwrap();

    let replaced = h.service.get(&created.id).await.unwrap();
    assert_eq!(replaced.name, "app2");
    assert!(replaced.component_links.is_empty());
    assert_eq!(replaced.created_at, created.created_at);
}

#[tokio::test]
async fn test_delete_and_missing_identity() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let created = h.service.create(AggregateDraft::named("app1")).await.unwrap();
    let mut events = h.event_bus.subscribe();

    h.service.delete(&created.id).await.unwrap();
    assert!(matches!(
        h.service.delete(&created.id).await,
        Err(AggregateError::NotFound(_))
    ));
    assert!(matches!(
        h.service
            .patch(&created.id, AggregatePatch::default(), PatchMode::Merge)
            .await,
        Err(AggregateError::NotFound(_))
    ));

    match events.recv().await.unwrap() {
        DomainEvent::Aggregate(AggregateEvent::AggregateDeleted { aggregate_id, .. }) => {
            assert_eq!(aggregate_id, created.id);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_template_is_a_pure_sample() {
    let h = harness(RecordingTemplateStore::default(), ScriptedNetworks::default());
    let template = h.service.template();
    assert!(!template.name.is_empty());
    assert_eq!(template.component_links.len(), 1);
    assert!(h.repository.is_empty());
}
