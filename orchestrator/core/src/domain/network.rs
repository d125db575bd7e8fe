// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container network lookups used by the aggregate cascade check.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::provisioning::ServiceError;

/// The slice of a container network's state the provisioner cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub link: String,

    /// True when the network's lifecycle is owned outside any aggregate
    pub external: bool,
}

#[async_trait]
pub trait NetworkQueryService: Send + Sync {
    /// Stream the summaries of the networks behind `links`.
    ///
    /// Unknown links are simply absent from the stream. A failing item does
    /// not end the stream.
    async fn list_by_links(
        &self,
        links: Vec<String>,
    ) -> Result<BoxStream<'static, Result<NetworkSummary, ServiceError>>, ServiceError>;
}
