// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource Link Conventions
//!
//! Every entity the provisioner talks about is addressed by a link: a
//! slash-separated path such as `/resources/containers/web-1`. The factory
//! prefix of a link identifies the kind of entity behind it, which is how the
//! aggregate lifecycle tells container members apart from network members
//! without fetching them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Link classification and path building

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Factory prefix for composite aggregates.
pub const COMPOSITE_COMPONENTS_PREFIX: &str = "/resources/composite-components";

/// Factory prefix for container components.
pub const CONTAINERS_PREFIX: &str = "/resources/containers";

/// Factory prefix for container networks.
pub const NETWORKS_PREFIX: &str = "/resources/container-networks";

/// Kind of entity a link points at, derived from its factory prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    CompositeComponent,
    Container,
    Network,
    Other,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("link prefix for {field} cannot be empty")]
    EmptyPrefix { field: &'static str },

    #[error("link prefix for {field} must start with '/': {prefix}")]
    NotAbsolute { field: &'static str, prefix: String },

    #[error("link prefixes overlap: '{first}' and '{second}'")]
    Overlapping { first: String, second: String },
}

/// Factory prefixes used to classify links and build aggregate links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConventions {
    #[serde(default = "default_composite_components")]
    pub composite_components: String,

    #[serde(default = "default_containers")]
    pub containers: String,

    #[serde(default = "default_networks")]
    pub networks: String,
}

fn default_composite_components() -> String {
    COMPOSITE_COMPONENTS_PREFIX.to_string()
}

fn default_containers() -> String {
    CONTAINERS_PREFIX.to_string()
}

fn default_networks() -> String {
    NETWORKS_PREFIX.to_string()
}

impl Default for LinkConventions {
    fn default() -> Self {
        Self {
            composite_components: default_composite_components(),
            containers: default_containers(),
            networks: default_networks(),
        }
    }
}

impl LinkConventions {
    /// Classify a link by the factory prefix it lives under.
    pub fn classify(&self, link: &str) -> LinkKind {
        if is_under(link, &self.networks) {
            LinkKind::Network
        } else if is_under(link, &self.containers) {
            LinkKind::Container
        } else if is_under(link, &self.composite_components) {
            LinkKind::CompositeComponent
        } else {
            LinkKind::Other
        }
    }

    pub fn is_network(&self, link: &str) -> bool {
        self.classify(link) == LinkKind::Network
    }

    /// Link of the composite aggregate with the given identity.
    pub fn composite_component_link(&self, id: &str) -> String {
        build_path(&self.composite_components, id)
    }

    /// Reject empty, relative and overlapping prefixes.
    pub fn validate(&self) -> Result<(), LinkError> {
        let prefixes = [
            ("composite_components", &self.composite_components),
            ("containers", &self.containers),
            ("networks", &self.networks),
        ];

        for (field, prefix) in prefixes {
            if prefix.is_empty() {
                return Err(LinkError::EmptyPrefix { field });
            }
            if !prefix.starts_with('/') {
                return Err(LinkError::NotAbsolute {
                    field,
                    prefix: prefix.clone(),
                });
            }
        }

        for (i, (_, first)) in prefixes.iter().enumerate() {
            for (_, second) in prefixes.iter().skip(i + 1) {
                if is_under(first, second) || is_under(second, first) {
                    return Err(LinkError::Overlapping {
                        first: (*first).clone(),
                        second: (*second).clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Join a factory prefix and an identity with exactly one separator.
pub fn build_path(prefix: &str, id: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        id.trim_start_matches('/')
    )
}

/// True when `link` equals `prefix` or sits below it on a segment boundary.
fn is_under(link: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match link.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
