//! Process-wide collaborators shared between the fast path, the dispatch
//! loop, and the DLQ sweep. The registry is
//! immutable; the store and HTTP client are the only shared mutable collaborators.

use relay_core::{ProviderRegistry, RelaySettings};
use relay_dispatch::DownstreamClient;
use relay_store::{DeadLetterQueue, EventRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct PipelineContext {
    pub registry: Arc<ProviderRegistry>,
    pub repo: EventRepository,
    pub dlq: DeadLetterQueue,
    pub downstream: DownstreamClient,
    pub settings: Arc<RelaySettings>,
}

impl PipelineContext {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        repo: EventRepository,
        dlq: DeadLetterQueue,
        settings: Arc<RelaySettings>,
    ) -> Self {
        let downstream = DownstreamClient::new(
            settings.journey_service_url.clone(),
            settings.service_to_service_token.clone(),
            settings.dispatch_timeout(),
        );
        Self {
            registry,
            repo,
            dlq,
            downstream,
            settings,
        }
    }
}
