//! Dead-Letter Queue: retry scheduling with exponential backoff,
//! abandonment after `max_retries`, resolution tracking.

use crate::models::{DlqEntry, DlqStats, DlqStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use relay_core::{RelayError, RelayResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const DEFAULT_MAX_DELAY_SECONDS: i64 = 60;
const PRIMING_DELAY_SECONDS: i64 = 1;

#[derive(Clone)]
pub struct DeadLetterQueue {
    conn: Arc<Mutex<Connection>>,
    max_delay_seconds: i64,
}

impl DeadLetterQueue {
    pub fn new<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        Self::with_max_delay(path, DEFAULT_MAX_DELAY_SECONDS)
    }

    pub fn in_memory() -> RelayResult<Self> {
        Self::with_max_delay_in_memory(DEFAULT_MAX_DELAY_SECONDS)
    }

    pub fn with_max_delay<P: AsRef<Path>>(path: P, max_delay_seconds: i64) -> RelayResult<Self> {
        let conn = Connection::open(path)?;
        let dlq = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_delay_seconds,
        };
        dlq.init_schema()?;
        Ok(dlq)
    }

    pub fn with_max_delay_in_memory(max_delay_seconds: i64) -> RelayResult<Self> {
        let conn = Connection::open_in_memory()?;
        let dlq = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_delay_seconds,
        };
        dlq.init_schema()?;
        Ok(dlq)
    }

    fn init_schema(&self) -> RelayResult<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS dead_letter_queue (
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL UNIQUE,
                error_message TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                max_retries INTEGER NOT NULL,
                next_retry_at TEXT,
                last_retry_at TEXT,
                status TEXT NOT NULL,
                resolved_at TEXT,
                resolution_note TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_dlq_status_next_retry
                ON dead_letter_queue(status, next_retry_at);
            ",
        )?;
        Ok(())
    }

    /// Create, reschedule, or abandon the entry for `event_id`.
    pub fn enqueue(&self, event_id: Uuid, error_message: &str, max_retries: u32) -> RelayResult<DlqEntry> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let existing = query_by_event_id(&conn, event_id)?;
        let now = Utc::now();

        match existing {
            None => {
                let id = Uuid::new_v4();
                let next_retry_at = now + ChronoDuration::seconds(PRIMING_DELAY_SECONDS);
                conn.execute(
                    "INSERT INTO dead_letter_queue
                        (id, event_id, error_message, retry_count, max_retries, next_retry_at,
                         last_retry_at, status, resolved_at, resolution_note, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 0, ?4, ?5, NULL, ?6, NULL, NULL, ?7, ?7)",
                    params![
                        id.to_string(),
                        event_id.to_string(),
                        error_message,
                        max_retries,
                        next_retry_at.to_rfc3339(),
                        DlqStatus::Pending.as_str(),
                        now.to_rfc3339(),
                    ],
                )?;
                Ok(DlqEntry {
                    id,
                    event_id,
                    error_message: error_message.to_string(),
                    retry_count: 0,
                    max_retries,
                    next_retry_at: Some(next_retry_at),
                    last_retry_at: None,
                    status: DlqStatus::Pending,
                    resolved_at: None,
                    resolution_note: None,
                    created_at: now,
                    updated_at: now,
                })
            }
            Some(entry) if entry.status == DlqStatus::Abandoned => {
                // Terminal: re-enqueuing an abandoned entry is a no-op.
                Ok(entry)
            }
            Some(entry) => {
                let retry_count = entry.retry_count + 1;
                let (status, next_retry_at) = if retry_count >= entry.max_retries {
                    (DlqStatus::Abandoned, None)
                } else {
                    let delay = self.delay_for_retry(retry_count);
                    (DlqStatus::Pending, Some(now + ChronoDuration::seconds(delay)))
                };

                conn.execute(
                    "UPDATE dead_letter_queue
                     SET retry_count = ?1, status = ?2, next_retry_at = ?3, last_retry_at = ?4,
                         error_message = ?5, updated_at = ?4
                     WHERE id = ?6",
                    params![
                        retry_count,
                        status.as_str(),
                        next_retry_at.map(|d: DateTime<Utc>| d.to_rfc3339()),
                        now.to_rfc3339(),
                        error_message,
                        entry.id.to_string(),
                    ],
                )?;

                Ok(DlqEntry {
                    retry_count,
                    status,
                    next_retry_at,
                    last_retry_at: Some(now),
                    error_message: error_message.to_string(),
                    updated_at: now,
                    ..entry
                })
            }
        }
    }

    /// Delay for the Nth retry (1-indexed): `2^N` seconds capped at
    /// `max_delay_seconds`. The first enqueue uses the shorter
    /// `PRIMING_DELAY_SECONDS`, handled separately in `enqueue`.
    fn delay_for_retry(&self, retry_count: u32) -> i64 {
        let exp = 2i64.checked_pow(retry_count).unwrap_or(i64::MAX);
        exp.min(self.max_delay_seconds)
    }

    /// `status IN {pending, retrying}` and due, ordered by `next_retry_at` asc.
    pub fn get_pending_retries(&self, limit: u32) -> RelayResult<Vec<DlqEntry>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT id, event_id, error_message, retry_count, max_retries, next_retry_at,
                    last_retry_at, status, resolved_at, resolution_note, created_at, updated_at
             FROM dead_letter_queue
             WHERE status IN ('pending', 'retrying') AND next_retry_at <= ?1
             ORDER BY next_retry_at ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![now, limit], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_retrying(&self, id: Uuid) -> RelayResult<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        conn.execute(
            "UPDATE dead_letter_queue SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![DlqStatus::Retrying.as_str(), Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn mark_resolved(&self, id: Uuid, note: &str) -> RelayResult<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE dead_letter_queue
             SET status = ?1, resolved_at = ?2, resolution_note = ?3, updated_at = ?2
             WHERE id = ?4",
            params![DlqStatus::Resolved.as_str(), now, note, id.to_string()],
        )?;
        Ok(())
    }

    pub fn get_by_event_id(&self, event_id: Uuid) -> RelayResult<Option<DlqEntry>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        query_by_event_id(&conn, event_id)
    }

    pub fn stats(&self) -> RelayResult<DlqStats> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stats = DlqStats::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM dead_letter_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            match DlqStatus::parse(&status) {
                Some(DlqStatus::Pending) => stats.pending = count,
                Some(DlqStatus::Retrying) => stats.retrying = count,
                Some(DlqStatus::Resolved) => stats.resolved = count,
                Some(DlqStatus::Abandoned) => stats.abandoned = count,
                None => {}
            }
            stats.total += count;
        }
        Ok(stats)
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> RelayError {
    RelayError::Database("dead letter queue lock poisoned".into())
}

fn query_by_event_id(conn: &Connection, event_id: Uuid) -> RelayResult<Option<DlqEntry>> {
    conn.query_row(
        "SELECT id, event_id, error_message, retry_count, max_retries, next_retry_at,
                last_retry_at, status, resolved_at, resolution_note, created_at, updated_at
         FROM dead_letter_queue WHERE event_id = ?1",
        params![event_id.to_string()],
        row_to_entry,
    )
    .optional()
    .map_err(RelayError::from)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DlqEntry> {
    let id: String = row.get(0)?;
    let event_id: String = row.get(1)?;
    let retry_count: i64 = row.get(3)?;
    let max_retries: i64 = row.get(4)?;
    let next_retry_at: Option<String> = row.get(5)?;
    let last_retry_at: Option<String> = row.get(6)?;
    let status_str: String = row.get(7)?;
    let resolved_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(DlqEntry {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        event_id: Uuid::parse_str(&event_id).unwrap_or_default(),
        error_message: row.get(2)?,
        retry_count: retry_count as u32,
        max_retries: max_retries as u32,
        next_retry_at: next_retry_at.as_deref().map(parse_rfc3339),
        last_retry_at: last_retry_at.as_deref().map(parse_rfc3339),
        status: DlqStatus::parse(&status_str).unwrap_or(DlqStatus::Pending),
        resolved_at: resolved_at.as_deref().map(parse_rfc3339),
        resolution_note: row.get(9)?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
