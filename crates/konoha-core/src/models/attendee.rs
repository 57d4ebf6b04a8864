//! Attendee and registration models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{is_valid_id, EventId};
use crate::error::Error;

/// Identifier of a registered user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttendeeId(String);

impl AttendeeId {
    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AttendeeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<String> for AttendeeId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_id(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidInput(format!("invalid attendee id: {value:?}")))
        }
    }
}

impl From<AttendeeId> for String {
    fn from(value: AttendeeId) -> Self {
        value.0
    }
}

/// A registered user, created with the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Unique identifier
    pub id: AttendeeId,
    /// Name shown to door staff
    pub display_name: String,
    /// Link to the owning account
    #[serde(default)]
    pub account_ref: Option<String>,
}

impl Attendee {
    #[must_use]
    pub fn new(id: AttendeeId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            account_ref: None,
        }
    }
}

/// State of an attendee's place on an event's list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Waiting,
    Accepted,
    Declined,
    Cancelled,
}

impl RegistrationStatus {
    /// Parse a stored status, accepting legacy one-letter values.
    ///
    /// Unknown values fall back to `Waiting`.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "accepted" | "a" => Self::Accepted,
            "declined" | "d" => Self::Declined,
            "cancelled" | "canceled" | "c" => Self::Cancelled,
            _ => Self::Waiting,
        }
    }

    /// Only accepted entrants may check in
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Registration of an attendee for an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
    pub status: RegistrationStatus,
}

/// Cached roster line for one attendee of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub attendee_id: AttendeeId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub registration: RegistrationStatus,
    /// A check-in exists locally or remotely
    pub checked_in: bool,
}

impl RosterEntry {
    #[must_use]
    pub const fn status(&self) -> AttendeeStatus {
        if self.checked_in {
            AttendeeStatus::CheckedIn
        } else if self.registration.is_registered() {
            AttendeeStatus::RegisteredNotCheckedIn
        } else {
            AttendeeStatus::Unregistered
        }
    }
}

/// Check-in status of an attendee for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendeeStatus {
    Unregistered,
    RegisteredNotCheckedIn,
    CheckedIn,
}

impl fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unregistered => "unregistered",
            Self::RegisteredNotCheckedIn => "registered-not-checked-in",
            Self::CheckedIn => "checked-in",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_status_legacy_shorthand() {
        assert_eq!(RegistrationStatus::parse_lenient("a"), RegistrationStatus::Accepted);
        assert_eq!(RegistrationStatus::parse_lenient("D"), RegistrationStatus::Declined);
        assert_eq!(RegistrationStatus::parse_lenient("c"), RegistrationStatus::Cancelled);
        assert_eq!(RegistrationStatus::parse_lenient("p"), RegistrationStatus::Waiting);
    }

    #[test]
    fn test_registration_status_full_names() {
        assert_eq!(
            RegistrationStatus::parse_lenient("ACCEPTED"),
            RegistrationStatus::Accepted
        );
        assert_eq!(
            RegistrationStatus::parse_lenient("cancelled"),
            RegistrationStatus::Cancelled
        );
    }

    #[test]
    fn test_registration_status_unknown_defaults_to_waiting() {
        assert_eq!(RegistrationStatus::parse_lenient("NULL"), RegistrationStatus::Waiting);
        assert_eq!(RegistrationStatus::parse_lenient(""), RegistrationStatus::Waiting);
    }

    #[test]
    fn test_only_accepted_is_registered() {
        assert!(RegistrationStatus::Accepted.is_registered());
        assert!(!RegistrationStatus::Waiting.is_registered());
        assert!(!RegistrationStatus::Declined.is_registered());
        assert!(!RegistrationStatus::Cancelled.is_registered());
    }

    #[test]
    fn test_roster_entry_status() {
        let mut entry = RosterEntry {
            attendee_id: "usr1".parse().unwrap(),
            display_name: None,
            registration: RegistrationStatus::Waiting,
            checked_in: false,
        };
        assert_eq!(entry.status(), AttendeeStatus::Unregistered);

        entry.registration = RegistrationStatus::Accepted;
        assert_eq!(entry.status(), AttendeeStatus::RegisteredNotCheckedIn);

        entry.checked_in = true;
        assert_eq!(entry.status(), AttendeeStatus::CheckedIn);
    }

    #[test]
    fn test_attendee_status_serializes_kebab_case() {
        let json = serde_json::to_string(&AttendeeStatus::RegisteredNotCheckedIn).unwrap();
        assert_eq!(json, "\"registered-not-checked-in\"");
        assert_eq!(AttendeeStatus::CheckedIn.to_string(), "checked-in");
    }
}
