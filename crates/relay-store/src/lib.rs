//! SQLite-backed persistence for the webhook relay: the event repository
//! and the dead-letter queue.

pub mod dlq;
pub mod event_repository;
pub mod models;

pub use dlq::DeadLetterQueue;
pub use event_repository::EventRepository;
pub use models::{DlqEntry, DlqStats, DlqStatus, EventStatus, StoredEvent};
