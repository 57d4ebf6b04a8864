//! Data models for Konoha

mod attendee;
mod check_in;
mod conflict;
mod event;

use std::sync::LazyLock;

use regex::Regex;

pub use attendee::{
    Attendee, AttendeeId, AttendeeStatus, Registration, RegistrationStatus, RosterEntry,
};
pub use check_in::{AttendanceSummary, CheckInKey, CheckInRecord, SyncState};
pub use conflict::{CheckInConflict, CONFLICT_STRATEGY};
pub use event::{Event, EventId};

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("Invalid regex"));

/// Document ids are limited to URL- and payload-safe characters.
///
/// ```
/// use konoha_core::models::is_valid_id;
///
/// assert!(is_valid_id("evt_2024-summer"));
/// assert!(!is_valid_id("has/slash"));
/// assert!(!is_valid_id(""));
/// ```
pub fn is_valid_id(value: &str) -> bool {
    ID_PATTERN.is_match(value)
}
