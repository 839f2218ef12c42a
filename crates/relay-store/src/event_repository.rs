//! Event Repository: durable record of every accepted webhook,
//! idempotent on `(provider, external_id)`.

use crate::models::{EventStatus, StoredEvent};
use chrono::{DateTime, Utc};
use relay_core::{CanonicalEvent, RelayError, RelayResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// `Arc<Mutex<Connection>>` so repository handles can be cloned freely and
/// shared with the dispatcher; callers on the async side wrap each method
/// in `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct EventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EventRepository {
    pub fn new<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn in_memory() -> RelayResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> RelayResult<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                event_type TEXT NOT NULL,
                external_id TEXT,
                user_identifier TEXT,
                organization_id TEXT,
                raw_payload TEXT NOT NULL,
                normalized_payload TEXT NOT NULL,
                status TEXT NOT NULL,
                received_at TEXT NOT NULL,
                processed_at TEXT,
                error_message TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS unique_provider_external_id
                ON events(provider, external_id)
                WHERE external_id IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_events_provider_status ON events(provider, status);
            CREATE INDEX IF NOT EXISTS idx_events_received_at ON events(received_at);
            ",
        )?;
        Ok(())
    }

    /// Insert a new event, or return the existing row for a repeat
    /// `(provider, external_id)` delivery.
    pub fn create_event(
        &self,
        provider: &str,
        event_type: &str,
        raw_payload: Value,
        normalized_payload: CanonicalEvent,
        external_id: Option<&str>,
        user_identifier: Option<&str>,
        organization_id: Option<&str>,
    ) -> RelayResult<StoredEvent> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;

        if let Some(ext_id) = external_id {
            if let Some(existing) = query_by_external_id(&conn, provider, ext_id)? {
                return Ok(existing);
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let raw_json = raw_payload.to_string();
        let normalized_json = serde_json::to_string(&normalized_payload)
            .map_err(|e| RelayError::Internal(e.to_string()))?;

        let insert_result = conn.execute(
            "INSERT INTO events
                (id, provider, event_type, external_id, user_identifier, organization_id,
                 raw_payload, normalized_payload, status, received_at, processed_at, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL)",
            params![
                id.to_string(),
                provider,
                event_type,
                external_id,
                user_identifier,
                organization_id,
                raw_json,
                normalized_json,
                EventStatus::Received.as_str(),
                now.to_rfc3339(),
            ],
        );

        match insert_result {
            Ok(_) => Ok(StoredEvent {
                id,
                provider: provider.to_string(),
                event_type: event_type.to_string(),
                external_id: external_id.map(str::to_owned),
                user_identifier: user_identifier.map(str::to_owned),
                organization_id: organization_id.map(str::to_owned),
                raw_payload,
                normalized_payload,
                status: EventStatus::Received,
                received_at: now,
                processed_at: None,
                error_message: None,
            }),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Lost a race against a concurrent identical delivery; the
                // unique index already has the authoritative row.
                let ext_id = external_id.ok_or_else(|| {
                    RelayError::Database("constraint violation with no external_id".into())
                })?;
                query_by_external_id(&conn, provider, ext_id)?.ok_or_else(|| {
                    RelayError::Database("constraint violation but row not found".into())
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_by_id(&self, id: Uuid) -> RelayResult<Option<StoredEvent>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        query_row(
            &conn,
            "SELECT id, provider, event_type, external_id, user_identifier, organization_id,
                    raw_payload, normalized_payload, status, received_at, processed_at, error_message
             FROM events WHERE id = ?1",
            params![id.to_string()],
        )
    }

    pub fn get_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> RelayResult<Option<StoredEvent>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        query_by_external_id(&conn, provider, external_id)
    }

    pub fn mark_processing(&self, id: Uuid) -> RelayResult<()> {
        self.transition(id, EventStatus::Processing, None)
    }

    pub fn mark_processed(&self, id: Uuid) -> RelayResult<()> {
        self.transition(id, EventStatus::Processed, None)
    }

    pub fn mark_failed(&self, id: Uuid, error_message: &str) -> RelayResult<()> {
        self.transition(id, EventStatus::Failed, Some(error_message))
    }

    fn transition(
        &self,
        id: Uuid,
        next: EventStatus,
        error_message: Option<&str>,
    ) -> RelayResult<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM events WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(current) = current.as_deref().and_then(EventStatus::parse) else {
            return Err(RelayError::Database(format!("event {id} not found")));
        };

        if !current.can_transition_to(next) {
            return Err(RelayError::Database(format!(
                "illegal status transition for event {id}: {:?} -> {:?}",
                current, next
            )));
        }

        let now = Utc::now().to_rfc3339();
        match next {
            EventStatus::Processed => {
                conn.execute(
                    "UPDATE events SET status = ?1, processed_at = ?2 WHERE id = ?3",
                    params![next.as_str(), now, id.to_string()],
                )?;
            }
            EventStatus::Failed => {
                conn.execute(
                    "UPDATE events SET status = ?1, error_message = ?2 WHERE id = ?3",
                    params![next.as_str(), error_message, id.to_string()],
                )?;
            }
            _ => {
                conn.execute(
                    "UPDATE events SET status = ?1 WHERE id = ?2",
                    params![next.as_str(), id.to_string()],
                )?;
            }
        }
        Ok(())
    }

    /// Ordered by `received_at` descending.
    pub fn list_failed(&self, provider: Option<&str>, limit: u32) -> RelayResult<Vec<StoredEvent>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let select = "SELECT id, provider, event_type, external_id, user_identifier, organization_id,
                    raw_payload, normalized_payload, status, received_at, processed_at, error_message
             FROM events WHERE status = 'failed'";

        let (sql, bind_provider) = match provider {
            Some(_) => (
                format!("{select} AND provider = ?1 ORDER BY received_at DESC LIMIT ?2"),
                true,
            ),
            None => (format!("{select} ORDER BY received_at DESC LIMIT ?1"), false),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = if bind_provider {
            stmt.query_map(params![provider.unwrap(), limit], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![limit], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> RelayError {
    RelayError::Database("event repository lock poisoned".into())
}

fn query_by_external_id(
    conn: &Connection,
    provider: &str,
    external_id: &str,
) -> RelayResult<Option<StoredEvent>> {
    query_row(
        conn,
        "SELECT id, provider, event_type, external_id, user_identifier, organization_id,
                raw_payload, normalized_payload, status, received_at, processed_at, error_message
         FROM events WHERE provider = ?1 AND external_id = ?2",
        params![provider, external_id],
    )
}

fn query_row(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> RelayResult<Option<StoredEvent>> {
    conn.query_row(sql, params, row_to_event)
        .optional()
        .map_err(RelayError::from)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEvent> {
    let id: String = row.get(0)?;
    let raw_payload_str: String = row.get(6)?;
    let normalized_payload_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let received_at_str: String = row.get(9)?;
    let processed_at_str: Option<String> = row.get(10)?;

    Ok(StoredEvent {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        provider: row.get(1)?,
        event_type: row.get(2)?,
        external_id: row.get(3)?,
        user_identifier: row.get(4)?,
        organization_id: row.get(5)?,
        raw_payload: serde_json::from_str(&raw_payload_str).unwrap_or(Value::Null),
        normalized_payload: serde_json::from_str(&normalized_payload_str).unwrap_or_else(|_| {
            CanonicalEvent::new("unknown", "unknown")
        }),
        status: EventStatus::parse(&status_str).unwrap_or(EventStatus::Received),
        received_at: parse_rfc3339(&received_at_str),
        processed_at: processed_at_str.as_deref().map(parse_rfc3339),
        error_message: row.get(11)?,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
