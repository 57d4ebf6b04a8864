//! Check-in engine facade used by the UI and the CLI

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    AttendanceSummary, AttendeeId, AttendeeStatus, CheckInConflict, Event, EventId,
};
use crate::remote::RemoteStore;
use crate::repository::CheckInRepository;
use crate::scan::{BarcodeDetector, Frame};
use crate::session::{self, ActiveSession, ScanSessionHandle};
use crate::sync::{SyncCoordinator, SyncReport};
use crate::token::TokenSigner;
use crate::validator::CheckInValidator;

/// Owns the repository, the sync coordinator and at most one scan session
pub struct CheckInEngine<S> {
    repository: CheckInRepository<S>,
    signer: TokenSigner,
    coordinator: Arc<SyncCoordinator<S>>,
    session: Mutex<Option<ActiveSession>>,
}

impl<S: RemoteStore> CheckInEngine<S> {
    /// Validate `config` and assemble an engine over `remote` and `db`
    pub async fn open(remote: S, db: Database, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let signer = TokenSigner::new(config.signing_key.as_bytes())?;
        let repository = CheckInRepository::new(Arc::new(remote), db, config).await?;
        let coordinator = Arc::new(SyncCoordinator::new(repository.clone(), config));

        info!(device_id = %repository.device_id(), "Check-in engine ready");
        Ok(Self {
            repository,
            signer,
            coordinator,
            session: Mutex::new(None),
        })
    }

    pub const fn repository(&self) -> &CheckInRepository<S> {
        &self.repository
    }

    pub const fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn device_id(&self) -> &str {
        self.repository.device_id()
    }

    /// Shared coordinator, e.g. to [`SyncCoordinator::spawn`] it
    #[must_use]
    pub fn sync_coordinator(&self) -> Arc<SyncCoordinator<S>> {
        Arc::clone(&self.coordinator)
    }

    pub async fn event(&self, event_id: &EventId) -> Result<Event> {
        self.repository.fetch_event(event_id).await
    }

    /// Start scanning for `event_id`.
    ///
    /// Fails with [`Error::SessionActive`] while another session runs and
    /// with [`Error::EventArchived`] for archived events. The roster is
    /// primed before the first frame is read.
    pub async fn start_scan_session<D>(
        &self,
        event_id: &EventId,
        detector: D,
        frames: mpsc::Receiver<Frame>,
    ) -> Result<ScanSessionHandle>
    where
        D: BarcodeDetector + 'static,
    {
        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref().filter(|active| active.is_running()) {
            return Err(Error::SessionActive(active.event_id.clone()));
        }

        let event = self.repository.fetch_event(event_id).await?;
        if !event.accepts_check_ins() {
            return Err(Error::EventArchived(event.id));
        }

        self.repository.prime_roster(event_id).await?;
        self.repository.watch_event(event_id);

        let validator =
            CheckInValidator::new(self.repository.clone(), self.signer.clone(), event.id);
        let (active, handle) = session::spawn(validator, detector, frames);
        *slot = Some(active);
        Ok(handle)
    }

    /// Stop the running session, if any. A scan already being recorded
    /// finishes first. Returns whether a session was stopped.
    pub async fn stop_scan_session(&self) -> bool {
        let active = self.session.lock().await.take();
        let Some(active) = active else {
            return false;
        };
        self.repository.unwatch();
        active.stop().await;
        true
    }

    /// Event of the running session
    pub async fn active_event(&self) -> Option<EventId> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|active| active.is_running())
            .map(|active| active.event_id.clone())
    }

    /// Run one sync pass now
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.coordinator.run_pass().await
    }

    /// Registration and check-in state of one attendee, read through to the
    /// remote store when this device has not seen the pair yet
    pub async fn attendee_status(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> Result<AttendeeStatus> {
        self.repository
            .fetch_attendee_status(event_id, attendee_id)
            .await
    }

    pub async fn attendance(&self, event_id: &EventId) -> Result<AttendanceSummary> {
        self.repository.attendance_summary(event_id).await
    }

    pub async fn conflicts(&self, limit: usize) -> Result<Vec<CheckInConflict>> {
        self.repository.list_conflicts(limit).await
    }

    /// Organizer reset of every check-in of an event
    pub async fn reset_event(&self, event_id: &EventId) -> Result<u64> {
        if self.active_event().await.as_ref() == Some(event_id) {
            return Err(Error::SessionActive(event_id.clone()));
        }
        self.repository.reset_event(event_id).await
    }
}
