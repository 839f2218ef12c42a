//! Orchestration layer: the synchronous ingestion fast path,
//! the background per-event dispatch loop, and the DLQ batch sweep that
//! drives retries pulled from [`relay_store::DeadLetterQueue`].

pub mod context;
pub mod dispatch_loop;
pub mod dlq_sweep;
pub mod ingest;

pub use context::PipelineContext;
pub use dlq_sweep::{retry_batch, DlqRetryOutcome};
pub use ingest::{process_webhook, IngestAccepted};
