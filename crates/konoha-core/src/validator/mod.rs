//! Per-scan validation and recording.
//!
//! Each decoded payload walks `Received -> Parsed -> Verified` and ends in
//! `Recorded` or `Rejected`. Everything here is local: the roster cache
//! answers the status question and the pending-write queue takes the record.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{AttendeeStatus, CheckInRecord, EventId};
use crate::remote::RemoteStore;
use crate::repository::CheckInRepository;
use crate::token::{parse_payload, TokenError, TokenSigner};

/// Stages of a single scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStage {
    Received,
    Parsed,
    Verified,
    Recorded,
    Rejected,
}

/// Why a scan did not produce a check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The payload is not a well-formed check-in token
    MalformedToken,
    /// The signature does not verify
    InvalidSignature,
    /// The attendee is already checked in (informational)
    DuplicateCheckIn,
    /// The token belongs to another event
    WrongEventContext,
    /// The attendee holds no accepted registration for the event
    NotRegistered,
    /// The local queue could not store the record
    StorageUnavailable,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed-token",
            Self::InvalidSignature => "invalid-signature",
            Self::DuplicateCheckIn => "duplicate-check-in",
            Self::WrongEventContext => "wrong-event-context",
            Self::NotRegistered => "not-registered",
            Self::StorageUnavailable => "storage-unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl From<&TokenError> for RejectReason {
    fn from(error: &TokenError) -> Self {
        match error {
            TokenError::Malformed(_) => Self::MalformedToken,
            TokenError::InvalidSignature => Self::InvalidSignature,
        }
    }
}

/// Terminal result of a scan attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Recorded(CheckInRecord),
    Rejected(RejectReason),
}

impl ScanOutcome {
    #[must_use]
    pub const fn stage(&self) -> ScanStage {
        match self {
            Self::Recorded(_) => ScanStage::Recorded,
            Self::Rejected(_) => ScanStage::Rejected,
        }
    }
}

/// Validates scans for one event and records the accepted ones
pub struct CheckInValidator<S> {
    repository: CheckInRepository<S>,
    signer: TokenSigner,
    event_id: EventId,
}

impl<S: RemoteStore> CheckInValidator<S> {
    #[must_use]
    pub const fn new(
        repository: CheckInRepository<S>,
        signer: TokenSigner,
        event_id: EventId,
    ) -> Self {
        Self {
            repository,
            signer,
            event_id,
        }
    }

    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Run one decoded payload through the state machine
    pub async fn process(&self, raw: &str) -> ScanOutcome {
        debug!(stage = ?ScanStage::Received, "Scan received");

        let token = match parse_payload(raw, &self.signer) {
            Ok(token) => token,
            Err(error) => {
                debug!(%error, "Rejecting unparseable payload");
                return self.reject(RejectReason::from(&error));
            }
        };
        debug!(stage = ?ScanStage::Parsed, attendee_id = %token.attendee_id, "Token parsed");

        if token.event_id != self.event_id {
            debug!(token_event = %token.event_id, "Token issued for another event");
            return self.reject(RejectReason::WrongEventContext);
        }

        match self
            .repository
            .cached_attendee_status(&self.event_id, &token.attendee_id)
        {
            AttendeeStatus::RegisteredNotCheckedIn => {}
            AttendeeStatus::CheckedIn => return self.reject(RejectReason::DuplicateCheckIn),
            AttendeeStatus::Unregistered => return self.reject(RejectReason::NotRegistered),
        }
        debug!(stage = ?ScanStage::Verified, attendee_id = %token.attendee_id, "Token verified");

        let record = CheckInRecord::new_pending(
            self.event_id.clone(),
            token.attendee_id,
            self.repository.device_id(),
        );

        // A concurrent scan of the same attendee loses here
        if !self
            .repository
            .try_mark_checked_in(&record.event_id, &record.attendee_id)
        {
            return self.reject(RejectReason::DuplicateCheckIn);
        }

        if let Err(error) = self.repository.enqueue_check_in(&record).await {
            warn!(check_in = %record.key(), %error, "Failed to enqueue check-in");
            self.repository
                .rollback_check_in(&record.event_id, &record.attendee_id);
            return self.reject(RejectReason::StorageUnavailable);
        }

        info!(check_in = %record.key(), "Check-in recorded");
        ScanOutcome::Recorded(record)
    }

    fn reject(&self, reason: RejectReason) -> ScanOutcome {
        debug!(event_id = %self.event_id, %reason, "Scan rejected");
        ScanOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::db::Database;
    use crate::models::{AttendeeId, Event, RegistrationStatus, SyncState};
    use crate::remote::MemoryRemoteStore;
    use pretty_assertions::assert_eq;

    const KEY: &str = "test-signing-key";

    fn event_id() -> EventId {
        "evt1".parse().unwrap()
    }

    fn attendee(id: &str) -> AttendeeId {
        id.parse().unwrap()
    }

    fn signer() -> TokenSigner {
        TokenSigner::new(KEY).unwrap()
    }

    fn payload(event: &str, attendee_id: &str) -> String {
        signer()
            .issue(&event.parse().unwrap(), &attendee(attendee_id), 1_700_000_000_000)
            .to_payload()
    }

    async fn validator() -> (
        CheckInValidator<MemoryRemoteStore>,
        CheckInRepository<MemoryRemoteStore>,
    ) {
        let remote = MemoryRemoteStore::new();
        remote.insert_event(Event::new(event_id(), "Festival", "org1", 0, i64::MAX));
        remote.register(&event_id(), &attendee("usr1"), RegistrationStatus::Accepted);
        remote.register(&event_id(), &attendee("usr2"), RegistrationStatus::Accepted);
        remote.register(&event_id(), &attendee("usr3"), RegistrationStatus::Waiting);

        let db = Database::open_in_memory().await.unwrap();
        let repository =
            CheckInRepository::new(Arc::new(remote), db, &EngineConfig::with_signing_key(KEY))
                .await
                .unwrap();
        repository.prime_roster(&event_id()).await.unwrap();

        (
            CheckInValidator::new(repository.clone(), signer(), event_id()),
            repository,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_token_twice_records_then_rejects() {
        let (validator, repository) = validator().await;
        let raw = payload("evt1", "usr1");

        let first = validator.process(&raw).await;
        let ScanOutcome::Recorded(record) = &first else {
            panic!("expected a recorded check-in, got {first:?}");
        };
        assert_eq!(record.sync_state, SyncState::Pending);
        assert_eq!(record.recorded_by, repository.device_id());

        assert_eq!(
            validator.process(&raw).await,
            ScanOutcome::Rejected(RejectReason::DuplicateCheckIn)
        );
        assert_eq!(repository.local_check_ins(&event_id()).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn token_for_other_event_is_wrong_context() {
        let (validator, repository) = validator().await;

        assert_eq!(
            validator.process(&payload("evt2", "usr1")).await,
            ScanOutcome::Rejected(RejectReason::WrongEventContext)
        );
        assert_eq!(
            repository.cached_attendee_status(&event_id(), &attendee("usr1")),
            AttendeeStatus::RegisteredNotCheckedIn
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn truncated_payload_is_malformed_and_leaves_state() {
        let (validator, repository) = validator().await;
        let raw = payload("evt1", "usr1");
        let (truncated, _signature) = raw.rsplit_once('/').unwrap();

        assert_eq!(
            validator.process(truncated).await,
            ScanOutcome::Rejected(RejectReason::MalformedToken)
        );
        assert_eq!(
            repository.cached_attendee_status(&event_id(), &attendee("usr1")),
            AttendeeStatus::RegisteredNotCheckedIn
        );
        assert!(repository.local_check_ins(&event_id()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forged_signature_is_rejected() {
        let (validator, _repository) = validator().await;
        let forged = TokenSigner::new("other-key")
            .unwrap()
            .issue(&event_id(), &attendee("usr1"), 1_700_000_000_000)
            .to_payload();

        assert_eq!(
            validator.process(&forged).await,
            ScanOutcome::Rejected(RejectReason::InvalidSignature)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn promotional_link_is_malformed() {
        let (validator, _repository) = validator().await;
        assert_eq!(
            validator.process("konoha://event/evt1").await,
            ScanOutcome::Rejected(RejectReason::MalformedToken)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn waiting_and_unknown_attendees_are_not_registered() {
        let (validator, _repository) = validator().await;
        assert_eq!(
            validator.process(&payload("evt1", "usr3")).await,
            ScanOutcome::Rejected(RejectReason::NotRegistered)
        );
        assert_eq!(
            validator.process(&payload("evt1", "ghost")).await,
            ScanOutcome::Rejected(RejectReason::NotRegistered)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_scans_of_one_attendee_record_once() {
        let (validator, repository) = validator().await;
        let validator = Arc::new(validator);
        let raw = payload("evt1", "usr2");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let validator = Arc::clone(&validator);
            let raw = raw.clone();
            tasks.push(tokio::spawn(async move { validator.process(&raw).await }));
        }

        let mut recorded = 0;
        for task in tasks {
            match task.await.unwrap() {
                ScanOutcome::Recorded(_) => recorded += 1,
                ScanOutcome::Rejected(reason) => {
                    assert_eq!(reason, RejectReason::DuplicateCheckIn);
                }
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(repository.local_check_ins(&event_id()).await.unwrap().len(), 1);
    }

    #[test]
    fn reject_reason_labels() {
        assert_eq!(RejectReason::WrongEventContext.to_string(), "wrong-event-context");
        assert_eq!(
            RejectReason::from(&TokenError::InvalidSignature),
            RejectReason::InvalidSignature
        );
        assert_eq!(
            ScanOutcome::Rejected(RejectReason::NotRegistered).stage(),
            ScanStage::Rejected
        );
    }
}
