//! Remote document store boundary.
//!
//! The remote store owns events, attendees, registrations and committed
//! check-ins. Check-ins are keyed by [`CheckInKey::document_id`] and created
//! with create-if-absent semantics, which is what makes the first committer
//! win.

mod document;
mod firestore;
mod memory;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::models::{
    Attendee, AttendeeId, CheckInKey, CheckInRecord, Event, EventId, RegistrationStatus,
    RosterEntry,
};

pub use firestore::FirestoreStore;
pub use memory::{MemoryRemoteStore, RemoteSnapshot};

/// Collection names in the remote store
pub const EVENTS_COLLECTION: &str = "events";
pub const ATTENDEES_COLLECTION: &str = "attendees";
pub const REGISTRATIONS_COLLECTION: &str = "registrations";
pub const CHECKINS_COLLECTION: &str = "checkins";

/// Errors returned by a remote store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Remote request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid remote document: {0}")]
    InvalidDocument(String),
}

impl RemoteError {
    /// Transient errors leave the outcome unknown and are retried later
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Outcome of a create-if-absent check-in write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The store already holds a record for the pair
    Conflict(CheckInRecord),
}

/// Callback invoked for check-ins committed to a watched event
pub type CheckInCallback = Arc<dyn Fn(&CheckInRecord) + Send + Sync>;

/// Handle returned by [`RemoteStore::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub id: u64,
    pub event_id: EventId,
}

/// Remote document store operations used by the engine
pub trait RemoteStore: Send + Sync + 'static {
    fn fetch_event(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = RemoteResult<Option<Event>>> + Send;

    fn fetch_attendee(
        &self,
        attendee_id: &AttendeeId,
    ) -> impl Future<Output = RemoteResult<Option<Attendee>>> + Send;

    fn fetch_registration(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> impl Future<Output = RemoteResult<Option<RegistrationStatus>>> + Send;

    /// Registrations of an event joined with existing check-ins
    fn fetch_roster(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = RemoteResult<Vec<RosterEntry>>> + Send;

    fn fetch_check_in(
        &self,
        key: &CheckInKey,
    ) -> impl Future<Output = RemoteResult<Option<CheckInRecord>>> + Send;

    fn list_check_ins(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = RemoteResult<Vec<CheckInRecord>>> + Send;

    /// Create the check-in unless a record for the pair exists
    fn create_check_in(
        &self,
        record: &CheckInRecord,
    ) -> impl Future<Output = RemoteResult<CommitOutcome>> + Send;

    /// Delete every check-in of an event, returning how many were removed
    fn delete_check_ins(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = RemoteResult<u64>> + Send;

    /// Push updates for check-ins of an event. `None` when unsupported.
    fn subscribe(&self, _event_id: &EventId, _callback: CheckInCallback) -> Option<Subscription> {
        None
    }

    fn unsubscribe(&self, _subscription: &Subscription) {}
}

/// Bound a remote call; expiry is reported as a transient `Timeout`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = RemoteResult<T>>,
) -> RemoteResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(RemoteError::Unavailable("offline".to_string()).is_transient());
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!RemoteError::Rejected("denied".to_string()).is_transient());
        assert!(!RemoteError::InvalidDocument("bad".to_string()).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_timeout() {
        let result: RemoteResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RemoteError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_result() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, RemoteError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
