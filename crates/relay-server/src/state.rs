//! Server state: the process-wide collaborators built once at startup
//! and shared, read-only, with every request handler and background task.

use chrono::{DateTime, Utc};
use relay_core::{ProviderRegistry, RelaySettings, SecretSource};
use relay_pipeline::PipelineContext;
use relay_store::{DeadLetterQueue, EventRepository};
use std::sync::Arc;

/// Cloned into every axum handler; cheap because every field is an `Arc`
/// or an internally-`Arc<Mutex<..>>`-backed handle.
#[derive(Clone)]
pub struct AppState {
    pub ctx: PipelineContext,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the registry, repository, and DLQ from `settings` and wire
    /// them into a [`PipelineContext`]. Called once from `main`.
    pub fn from_settings(settings: RelaySettings) -> relay_core::RelayResult<Self> {
        let registry = Arc::new(ProviderRegistry::with_defaults(&settings));
        let repo = if settings.db_path == ":memory:" {
            EventRepository::in_memory()?
        } else {
            if let Some(parent) = std::path::Path::new(&settings.db_path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            EventRepository::new(&settings.db_path)?
        };
        let dlq = if settings.db_path == ":memory:" {
            DeadLetterQueue::in_memory()?
        } else {
            DeadLetterQueue::new(&settings.db_path)?
        };
        let ctx = PipelineContext::new(registry, repo, dlq, Arc::new(settings));
        Ok(Self {
            ctx,
            started_at: Utc::now(),
        })
    }
}
