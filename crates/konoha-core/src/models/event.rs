//! Event model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::is_valid_id;
use crate::error::Error;

/// Identifier of an event document in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<String> for EventId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_id(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidInput(format!("invalid event id: {value:?}")))
        }
    }
}

impl From<EventId> for String {
    fn from(value: EventId) -> Self {
        value.0
    }
}

/// An event attendees can check in to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Document identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Start of the event (Unix ms)
    pub start_time: i64,
    /// End of the event (Unix ms)
    pub end_time: i64,
    /// Venue description
    #[serde(default)]
    pub venue: Option<String>,
    /// Reference to the banner image, rendered by the UI only
    #[serde(default)]
    pub banner_image_ref: Option<String>,
    /// Organizer account that owns the event
    pub organizer_id: String,
    /// Archived events no longer accept check-ins
    #[serde(default)]
    pub archived: bool,
}

impl Event {
    /// Create a new, non-archived event
    #[must_use]
    pub fn new(
        id: EventId,
        name: impl Into<String>,
        organizer_id: impl Into<String>,
        start_time: i64,
        end_time: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            start_time,
            end_time,
            venue: None,
            banner_image_ref: None,
            organizer_id: organizer_id.into(),
            archived: false,
        }
    }

    /// Set the venue
    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    /// Whether a scan session may be started for this event
    #[must_use]
    pub const fn accepts_check_ins(&self) -> bool {
        !self.archived
    }

    /// Whether `timestamp` (Unix ms) falls inside the event's schedule
    #[must_use]
    pub const fn is_running_at(&self, timestamp: i64) -> bool {
        timestamp >= self.start_time && timestamp <= self.end_time
    }
}
