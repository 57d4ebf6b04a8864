//! Check-in conflict audit model

use serde::{Deserialize, Serialize};

/// Resolution policy recorded with every conflict
pub const CONFLICT_STRATEGY: &str = "first-committer-wins";

/// A local check-in that lost to a record another device committed first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInConflict {
    /// Conflict row identifier
    pub id: i64,
    pub event_id: String,
    pub attendee_id: String,
    /// Timestamp of the losing local scan (Unix ms)
    pub local_timestamp: i64,
    /// Device that produced the losing scan
    pub local_recorded_by: String,
    /// Timestamp of the winning remote record (Unix ms)
    pub remote_timestamp: i64,
    /// Device that produced the winning record
    pub remote_recorded_by: String,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
