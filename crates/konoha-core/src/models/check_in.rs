//! Check-in record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AttendeeId, EventId};
use crate::error::Error;

/// Replication state of a check-in record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Recorded locally, waiting for the remote commit
    Pending,
    /// Confirmed by the remote store
    Synced,
    /// Another device committed first; kept for audit only
    Conflict,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown sync state: {other}"))),
        }
    }
}

/// Composite key; at most one check-in exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckInKey {
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
}

impl CheckInKey {
    #[must_use]
    pub const fn new(event_id: EventId, attendee_id: AttendeeId) -> Self {
        Self {
            event_id,
            attendee_id,
        }
    }

    /// Document id of the check-in in the `checkins` collection.
    ///
    /// `:` never appears in ids, so the composite is unambiguous.
    #[must_use]
    pub fn document_id(&self) -> String {
        format!("{}:{}", self.event_id, self.attendee_id)
    }
}

impl fmt::Display for CheckInKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.attendee_id)
    }
}

/// A recorded check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
    /// When the attendee was scanned (Unix ms)
    pub timestamp: i64,
    /// Device that scanned the attendee
    pub recorded_by: String,
    pub sync_state: SyncState,
}

impl CheckInRecord {
    /// Create a pending record scanned now by `recorded_by`
    #[must_use]
    pub fn new_pending(
        event_id: EventId,
        attendee_id: AttendeeId,
        recorded_by: impl Into<String>,
    ) -> Self {
        Self {
            event_id,
            attendee_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            recorded_by: recorded_by.into(),
            sync_state: SyncState::Pending,
        }
    }

    #[must_use]
    pub fn key(&self) -> CheckInKey {
        CheckInKey::new(self.event_id.clone(), self.attendee_id.clone())
    }

    /// Whether `other` is this same write, as echoed back by the remote store
    #[must_use]
    pub fn is_same_write(&self, other: &Self) -> bool {
        self.key() == other.key()
            && self.recorded_by == other.recorded_by
            && self.timestamp == other.timestamp
    }

    #[must_use]
    pub fn with_state(mut self, sync_state: SyncState) -> Self {
        self.sync_state = sync_state;
        self
    }
}

/// Attendance counts for the organizer view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub event_id: EventId,
    /// Check-ins confirmed by the remote store
    pub synced: usize,
    /// Local check-ins not yet confirmed
    pub pending: usize,
    /// Local check-ins that lost to another device (excluded from attendance)
    pub conflicts: usize,
}

impl AttendanceSummary {
    /// Best current estimate of attendance
    #[must_use]
    pub const fn attendance(&self) -> usize {
        self.synced + self.pending
    }
}
