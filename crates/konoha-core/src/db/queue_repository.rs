//! Pending-write queue and conflict audit log

use crate::error::{Error, Result};
use crate::models::{CheckInConflict, CheckInRecord, EventId, SyncState, CONFLICT_STRATEGY};
use crate::util::{non_empty_trimmed, now_millis};
use libsql::{params, Connection, Row};

const QUEUE_COLUMNS: &str =
    "seq, event_id, attendee_id, timestamp, recorded_by, sync_state, attempts, last_error";

/// A record in the local queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCheckIn {
    /// Local append order
    pub seq: i64,
    pub record: CheckInRecord,
    /// Failed commit attempts so far
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Trait for the device-local pending-write queue (async)
#[allow(async_fn_in_trait)]
pub trait PendingQueueRepository {
    /// Append a record; fails if the pair was already recorded on this device
    async fn append(&self, record: &CheckInRecord) -> Result<i64>;

    /// Pending records with `seq > after_seq`, in queue order
    async fn list_pending(&self, after_seq: i64, limit: usize) -> Result<Vec<QueuedCheckIn>>;

    /// All locally held records (pending and conflict) for an event
    async fn list_for_event(&self, event_id: &EventId) -> Result<Vec<QueuedCheckIn>>;

    /// Remove a record confirmed by the remote store
    async fn remove(&self, seq: i64) -> Result<()>;

    /// Keep a record pending and remember why its commit failed
    async fn record_failure(&self, seq: i64, error: &str) -> Result<()>;

    /// Mark a record as conflicted and write the audit row, atomically
    async fn resolve_conflict(
        &self,
        seq: i64,
        local: &CheckInRecord,
        remote: &CheckInRecord,
    ) -> Result<CheckInConflict>;

    /// Most recently resolved conflicts first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<CheckInConflict>>;

    /// Count `(pending, conflict)` records for an event
    async fn count_by_state(&self, event_id: &EventId) -> Result<(usize, usize)>;

    /// Drop every local record for an event (organizer reset)
    async fn delete_for_event(&self, event_id: &EventId) -> Result<u64>;
}

/// libSQL implementation of `PendingQueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_queued(row: &Row) -> Result<QueuedCheckIn> {
        let event_id: String = row.get(1)?;
        let attendee_id: String = row.get(2)?;
        let sync_state: String = row.get(5)?;
        let last_error: String = row.get(7)?;

        Ok(QueuedCheckIn {
            seq: row.get(0)?,
            record: CheckInRecord {
                event_id: event_id.parse().map_err(corrupt_row)?,
                attendee_id: attendee_id.parse().map_err(corrupt_row)?,
                timestamp: row.get(3)?,
                recorded_by: row.get(4)?,
                sync_state: sync_state.parse().map_err(corrupt_row)?,
            },
            attempts: row.get(6)?,
            last_error: non_empty_trimmed(Some(last_error)),
        })
    }

    fn parse_conflict(row: &Row) -> Result<CheckInConflict> {
        Ok(CheckInConflict {
            id: row.get(0)?,
            event_id: row.get(1)?,
            attendee_id: row.get(2)?,
            local_timestamp: row.get(3)?,
            local_recorded_by: row.get(4)?,
            remote_timestamp: row.get(5)?,
            remote_recorded_by: row.get(6)?,
            resolved_at: row.get(7)?,
            strategy: row.get(8)?,
        })
    }

    async fn collect_queued(&self, mut rows: libsql::Rows) -> Result<Vec<QueuedCheckIn>> {
        let mut queued = Vec::new();
        while let Some(row) = rows.next().await? {
            queued.push(Self::parse_queued(&row)?);
        }
        Ok(queued)
    }

    async fn insert_conflict_row(
        &self,
        local: &CheckInRecord,
        remote: &CheckInRecord,
    ) -> Result<CheckInConflict> {
        let resolved_at = now_millis();
        self.conn
            .execute(
                "INSERT INTO checkin_conflicts (
                    event_id, attendee_id, local_timestamp, local_recorded_by,
                    remote_timestamp, remote_recorded_by, resolved_at, strategy
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    local.event_id.as_str(),
                    local.attendee_id.as_str(),
                    local.timestamp,
                    local.recorded_by.as_str(),
                    remote.timestamp,
                    remote.recorded_by.as_str(),
                    resolved_at,
                    CONFLICT_STRATEGY
                ],
            )
            .await?;

        Ok(CheckInConflict {
            id: self.conn.last_insert_rowid(),
            event_id: local.event_id.to_string(),
            attendee_id: local.attendee_id.to_string(),
            local_timestamp: local.timestamp,
            local_recorded_by: local.recorded_by.clone(),
            remote_timestamp: remote.timestamp,
            remote_recorded_by: remote.recorded_by.clone(),
            resolved_at,
            strategy: CONFLICT_STRATEGY.to_string(),
        })
    }
}

fn corrupt_row(error: Error) -> Error {
    Error::Database(format!("corrupt pending_checkins row: {error}"))
}

impl PendingQueueRepository for LibSqlQueueRepository<'_> {
    async fn append(&self, record: &CheckInRecord) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO pending_checkins (event_id, attendee_id, timestamp, recorded_by, sync_state)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    record.event_id.as_str(),
                    record.attendee_id.as_str(),
                    record.timestamp,
                    record.recorded_by.as_str(),
                    SyncState::Pending.as_str()
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn list_pending(&self, after_seq: i64, limit: usize) -> Result<Vec<QueuedCheckIn>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM pending_checkins
                     WHERE sync_state = 'pending' AND seq > ?
                     ORDER BY seq ASC
                     LIMIT ?"
                ),
                params![after_seq, limit],
            )
            .await?;
        self.collect_queued(rows).await
    }

    async fn list_for_event(&self, event_id: &EventId) -> Result<Vec<QueuedCheckIn>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM pending_checkins
                     WHERE event_id = ?
                     ORDER BY seq ASC"
                ),
                params![event_id.as_str()],
            )
            .await?;
        self.collect_queued(rows).await
    }

    async fn remove(&self, seq: i64) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM pending_checkins WHERE seq = ?", params![seq])
            .await?;
        if rows == 0 {
            return Err(Error::NotFound(format!("queued check-in {seq}")));
        }
        Ok(())
    }

    async fn record_failure(&self, seq: i64, error: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE pending_checkins SET attempts = attempts + 1, last_error = ?
                 WHERE seq = ? AND sync_state = 'pending'",
                params![error, seq],
            )
            .await?;
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        seq: i64,
        local: &CheckInRecord,
        remote: &CheckInRecord,
    ) -> Result<CheckInConflict> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result: Result<CheckInConflict> = async {
            self.conn
                .execute(
                    "UPDATE pending_checkins SET sync_state = ? WHERE seq = ?",
                    params![SyncState::Conflict.as_str(), seq],
                )
                .await?;
            self.insert_conflict_row(local, remote).await
        }
        .await;

        match result {
            Ok(conflict) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(conflict)
            }
            Err(error) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<CheckInConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, event_id, attendee_id, local_timestamp, local_recorded_by,
                        remote_timestamp, remote_recorded_by, resolved_at, strategy
                 FROM checkin_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                params![limit],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }

    async fn count_by_state(&self, event_id: &EventId) -> Result<(usize, usize)> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                    COALESCE(SUM(CASE WHEN sync_state = 'pending' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN sync_state = 'conflict' THEN 1 ELSE 0 END), 0)
                 FROM pending_checkins WHERE event_id = ?",
                params![event_id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok((0, 0));
        };
        let pending = usize::try_from(row.get::<i64>(0)?).unwrap_or(0);
        let conflicts = usize::try_from(row.get::<i64>(1)?).unwrap_or(0);
        Ok((pending, conflicts))
    }

    async fn delete_for_event(&self, event_id: &EventId) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM pending_checkins WHERE event_id = ?",
                params![event_id.as_str()],
            )
            .await?;
        Ok(rows)
    }
}
