//! Offline cache of events and their rosters

use crate::error::{Error, Result};
use crate::models::{AttendeeId, Event, EventId, RegistrationStatus, RosterEntry};
use crate::util::{non_empty_trimmed, now_millis};
use libsql::{params, Connection, Row};

/// Trait for the persisted roster cache (async)
#[allow(async_fn_in_trait)]
pub trait RosterRepository {
    /// Cache an event document
    async fn save_event(&self, event: &Event) -> Result<()>;

    /// Load a cached event document
    async fn load_event(&self, event_id: &EventId) -> Result<Option<Event>>;

    /// Replace the cached roster of an event
    async fn replace_roster(&self, event_id: &EventId, entries: &[RosterEntry]) -> Result<()>;

    /// Insert or update one roster line
    async fn upsert_entry(&self, event_id: &EventId, entry: &RosterEntry) -> Result<()>;

    /// Load the cached roster of an event
    async fn load_roster(&self, event_id: &EventId) -> Result<Vec<RosterEntry>>;

    /// Flip the checked-in flag of one attendee, creating the line if needed
    async fn set_checked_in(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
        checked_in: bool,
    ) -> Result<()>;

    /// Clear every checked-in flag of an event
    async fn clear_checked_in(&self, event_id: &EventId) -> Result<()>;
}

/// libSQL implementation of `RosterRepository`
pub struct LibSqlRosterRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRosterRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<RosterEntry> {
        let attendee_id: String = row.get(0)?;
        let display_name: String = row.get(1)?;
        let registration: String = row.get(2)?;

        Ok(RosterEntry {
            attendee_id: attendee_id
                .parse()
                .map_err(|error| Error::Database(format!("corrupt roster_cache row: {error}")))?,
            display_name: non_empty_trimmed(Some(display_name)),
            registration: RegistrationStatus::parse_lenient(&registration),
            checked_in: row.get::<i64>(3)? != 0,
        })
    }

    async fn insert_entry(&self, event_id: &EventId, entry: &RosterEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO roster_cache (event_id, attendee_id, display_name, registration, checked_in, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(event_id, attendee_id) DO UPDATE SET
                    display_name = excluded.display_name,
                    registration = excluded.registration,
                    checked_in = excluded.checked_in,
                    updated_at = excluded.updated_at",
                params![
                    event_id.as_str(),
                    entry.attendee_id.as_str(),
                    entry.display_name.clone().unwrap_or_default(),
                    entry.registration.as_str(),
                    i64::from(entry.checked_in),
                    now_millis()
                ],
            )
            .await?;
        Ok(())
    }
}

impl RosterRepository for LibSqlRosterRepository<'_> {
    async fn save_event(&self, event: &Event) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        self.conn
            .execute(
                "INSERT INTO events_cache (id, payload, cached_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, cached_at = excluded.cached_at",
                params![event.id.as_str(), payload, now_millis()],
            )
            .await?;
        Ok(())
    }

    async fn load_event(&self, event_id: &EventId) -> Result<Option<Event>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM events_cache WHERE id = ?",
                params![event_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn replace_roster(&self, event_id: &EventId, entries: &[RosterEntry]) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result: Result<()> = async {
            self.conn
                .execute(
                    "DELETE FROM roster_cache WHERE event_id = ?",
                    params![event_id.as_str()],
                )
                .await?;
            for entry in entries {
                self.insert_entry(event_id, entry).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(())
            }
            Err(error) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    async fn upsert_entry(&self, event_id: &EventId, entry: &RosterEntry) -> Result<()> {
        self.insert_entry(event_id, entry).await
    }

    async fn load_roster(&self, event_id: &EventId) -> Result<Vec<RosterEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT attendee_id, display_name, registration, checked_in
                 FROM roster_cache WHERE event_id = ?
                 ORDER BY attendee_id ASC",
                params![event_id.as_str()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn set_checked_in(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
        checked_in: bool,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO roster_cache (event_id, attendee_id, registration, checked_in, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(event_id, attendee_id) DO UPDATE SET
                    checked_in = excluded.checked_in,
                    updated_at = excluded.updated_at",
                params![
                    event_id.as_str(),
                    attendee_id.as_str(),
                    RegistrationStatus::Waiting.as_str(),
                    i64::from(checked_in),
                    now_millis()
                ],
            )
            .await?;
        Ok(())
    }

    async fn clear_checked_in(&self, event_id: &EventId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE roster_cache SET checked_in = 0, updated_at = ? WHERE event_id = ?",
                params![now_millis(), event_id.as_str()],
            )
            .await?;
        Ok(())
    }
}
