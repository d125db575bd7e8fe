// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Composite Aggregate
//!
//! A composite aggregate groups the links of components that were provisioned
//! together (containers, networks, closures, ...) under one named entity,
//! optionally tied to the description template it was deployed from.
//!
//! # Invariants
//!
//! - `name` is never empty.
//! - `created_at` is stamped once at creation and never touched by a merge.
//! - `component_links` behaves as an insertion-ordered set: merges only append
//!   links not yet present; links are removed only by an explicit removal patch.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregate state and merge rules (no I/O)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::repository::RepositoryError;

/// Identity of a composite aggregate.
///
/// Usually the composition context identifier of the request that deployed
/// the components, otherwise a random UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(pub String);

impl AggregateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AggregateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeAggregate {
    pub id: AggregateId,

    pub name: String,

    /// Link of the description template this aggregate was deployed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_link: Option<String>,

    #[serde(default)]
    pub component_links: Vec<String>,

    pub created_at: DateTime<Utc>,

    /// Multi-tenancy markers, passed through untouched
    #[serde(default)]
    pub tenant_links: Vec<String>,
}

/// Body of a create or replace request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateDraft {
    /// Requested identity; a random one is assigned when absent
    #[serde(default)]
    pub id: Option<AggregateId>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description_link: Option<String>,

    #[serde(default)]
    pub component_links: Vec<String>,

    #[serde(default)]
    pub tenant_links: Vec<String>,
}

impl AggregateDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Delta carried by a patch request. `None` fields keep the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatePatch {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description_link: Option<String>,

    #[serde(default)]
    pub component_links: Option<Vec<String>>,
}

impl AggregatePatch {
    pub fn links<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            component_links: Some(links.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// How `component_links` in a patch are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    /// Union-merge the delta links into the current set
    #[default]
    Merge,
    /// Remove the delta links from the current set
    RemoveLinks,
}

/// Result of merging a patch into the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// False when the content signature is unchanged by the merge
    pub modified: bool,

    /// Links left after a removal patch; `None` when nothing was removed
    pub remainder: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Composite aggregate not found: {0}")]
    NotFound(AggregateId),

    #[error("Composite aggregate already exists: {0}")]
    AlreadyExists(AggregateId),

    #[error("Failed to compute content signature: {0}")]
    Signature(#[from] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CompositeAggregate {
    /// Build a new aggregate from a create request, stamping `created_at`.
    pub fn create(draft: AggregateDraft) -> Result<Self, AggregateError> {
        validate_name(&draft.name)?;

        Ok(Self {
            id: draft.id.unwrap_or_default(),
            name: draft.name,
            description_link: draft.description_link,
            component_links: merge_links(Vec::new(), draft.component_links),
            created_at: Utc::now(),
            tenant_links: draft.tenant_links,
        })
    }

    /// Overwrite every field from a replace request, keeping identity and
    /// creation time.
    pub fn replace_with(&mut self, draft: AggregateDraft) -> Result<(), AggregateError> {
        validate_name(&draft.name)?;

        self.name = draft.name;
        self.description_link = draft.description_link;
        self.component_links = merge_links(Vec::new(), draft.component_links);
        self.tenant_links = draft.tenant_links;
        Ok(())
    }

    /// Structural content signature used to detect no-op updates.
    pub fn signature(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Merge a patch into the current state.
    ///
    /// Scalar fields follow last-non-null-wins. Links are union-merged in
    /// first-seen order, unless `mode` is [`PatchMode::RemoveLinks`] and the
    /// patch carries links, in which case those links are removed and the
    /// remainder is returned for the post-commit cascade check.
    pub fn apply_patch(
        &mut self,
        patch: AggregatePatch,
        mode: PatchMode,
    ) -> Result<MergeOutcome, AggregateError> {
        let before = self.signature()?;

        if let Some(name) = patch.name {
            validate_name(&name)?;
            self.name = name;
        }
        if let Some(description_link) = patch.description_link {
            self.description_link = Some(description_link);
        }

        let remainder = match (mode, patch.component_links) {
            (PatchMode::RemoveLinks, Some(removed)) => {
                self.component_links.retain(|link| !removed.contains(link));
                Some(self.component_links.clone())
            }
            (_, delta) => {
                if let Some(delta) = delta {
                    let current = std::mem::take(&mut self.component_links);
                    self.component_links = merge_links(current, delta);
                }
                None
            }
        };

        let after = self.signature()?;

        Ok(MergeOutcome {
            modified: before != after,
            remainder,
        })
    }

    /// Sample instance describing the shape of the entity for discovery tools.
    pub fn document_template() -> Self {
        Self {
            id: AggregateId("id (string)".to_string()),
            name: "name (string)".to_string(),
            description_link: Some("descriptionLink (string) (optional)".to_string()),
            component_links: vec!["componentLink (string)".to_string()],
            created_at: DateTime::<Utc>::default(),
            tenant_links: Vec::new(),
        }
    }
}

fn validate_name(name: &str) -> Result<(), AggregateError> {
    if name.trim().is_empty() {
        return Err(AggregateError::Validation(
            "'name' is required".to_string(),
        ));
    }
    Ok(())
}

/// Append the links of `delta` not already in `current`, keeping first-seen order.
fn merge_links(mut current: Vec<String>, delta: Vec<String>) -> Vec<String> {
    for link in delta {
        if !current.contains(&link) {
            current.push(link);
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(links: &[&str]) -> CompositeAggregate {
        CompositeAggregate::create(AggregateDraft {
            component_links: links.iter().map(|l| l.to_string()).collect(),
            ..AggregateDraft::named("app1")
        })
        .unwrap()
    }

    #[test]
    fn test_create_requires_name() {
        let result = CompositeAggregate::create(AggregateDraft::named("  "));
        assert!(matches!(result, Err(AggregateError::Validation(_))));
    }

    #[test]
    fn test_create_deduplicates_links() {
        let created = aggregate(&["c/1", "c/2", "c/1"]);
        assert_eq!(created.component_links, vec!["c/1", "c/2"]);
        assert_eq!(created.name, "app1");
    }

    #[test]
    fn test_merge_is_union_in_first_seen_order() {
        let mut current = aggregate(&["c/1", "c/2"]);
        let outcome = current
            .apply_patch(AggregatePatch::links(["c/3", "c/1", "c/4"]), PatchMode::Merge)
            .unwrap();

        assert!(outcome.modified);
        assert_eq!(outcome.remainder, None);
        assert_eq!(current.component_links, vec!["c/1", "c/2", "c/3", "c/4"]);
    }

    #[test]
    fn test_identical_patch_is_not_modified() {
        let mut current = aggregate(&["c/1"]);
        current.description_link = Some("/templates/t1".to_string());
        let before = current.clone();

        let outcome = current
            .apply_patch(
                AggregatePatch {
                    name: Some("app1".to_string()),
                    description_link: Some("/templates/t1".to_string()),
                    component_links: Some(vec!["c/1".to_string()]),
                },
                PatchMode::Merge,
            )
            .unwrap();

        assert!(!outcome.modified);
        assert_eq!(current, before);
    }

    #[test]
    fn test_null_fields_keep_current_values() {
        let mut current = aggregate(&["c/1"]);
        current.description_link = Some("/templates/t1".to_string());

        current
            .apply_patch(AggregatePatch::default(), PatchMode::Merge)
            .unwrap();

        assert_eq!(current.name, "app1");
        assert_eq!(current.description_link.as_deref(), Some("/templates/t1"));
        assert_eq!(current.component_links, vec!["c/1"]);
    }

    #[test]
    fn test_blank_name_patch_is_rejected_without_changes() {
        let mut current = aggregate(&["c/1"]);
        let before = current.clone();

        let result = current.apply_patch(
            AggregatePatch {
                name: Some(String::new()),
                component_links: Some(vec!["c/2".to_string()]),
                ..Default::default()
            },
            PatchMode::Merge,
        );

        assert!(matches!(result, Err(AggregateError::Validation(_))));
        assert_eq!(current, before);
    }

    #[test]
    fn test_remove_links_returns_remainder() {
        let mut current = aggregate(&["c/1", "c/2", "c/3"]);
        let outcome = current
            .apply_patch(AggregatePatch::links(["c/2", "c/9"]), PatchMode::RemoveLinks)
            .unwrap();

        assert!(outcome.modified);
        assert_eq!(outcome.remainder, Some(vec!["c/1".to_string(), "c/3".to_string()]));
        assert_eq!(current.component_links, vec!["c/1", "c/3"]);
    }

    #[test]
    fn test_remove_mode_without_links_falls_back_to_merge() {
        let mut current = aggregate(&["c/1"]);
        let outcome = current
            .apply_patch(
                AggregatePatch {
                    name: Some("renamed".to_string()),
                    ..AggregatePatch::default()
                },
                PatchMode::RemoveLinks,
            )
            .unwrap();

        assert_eq!(outcome.remainder, None);
        assert_eq!(current.name, "renamed");
        assert_eq!(current.component_links, vec!["c/1"]);
    }

    #[test]
    fn test_merge_never_touches_created_at() {
        let mut current = aggregate(&[]);
        let created_at = current.created_at;
        current
            .apply_patch(AggregatePatch::links(["c/1"]), PatchMode::Merge)
            .unwrap();
        assert_eq!(current.created_at, created_at);
    }

    #[test]
    fn test_replace_keeps_identity_and_created_at() {
        let mut current = aggregate(&["c/1"]);
        let id = current.id.clone();
        let created_at = current.created_at;

        current
            .replace_with(AggregateDraft {
                id: Some(AggregateId::from("other")),
                ..AggregateDraft::named("app2")
            })
            .unwrap();

        assert_eq!(current.id, id);
        assert_eq!(current.created_at, created_at);
        assert_eq!(current.name, "app2");
        assert!(current.component_links.is_empty());
    }

    #[test]
    fn test_signature_changes_with_content() {
        let first = aggregate(&["c/1"]);
        let mut second = first.clone();
        assert_eq!(first.signature().unwrap(), second.signature().unwrap());

        second.component_links.push("c/2".to_string());
        assert_ne!(first.signature().unwrap(), second.signature().unwrap());
    }
}
