//! Read-through access to events and rosters.
//!
//! The repository fronts the remote store with a local libSQL copy and an
//! in-memory roster of the active event. Scan-path operations
//! ([`CheckInRepository::cached_attendee_status`],
//! [`CheckInRepository::enqueue_check_in`]) never touch the network; only the
//! read-through lookups and the sync helpers do, each bounded by a timeout.

mod cache;

pub use cache::RosterCache;

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db::{
    Database, LibSqlQueueRepository, LibSqlRosterRepository, LibSqlSettingsRepository,
    PendingQueueRepository, QueuedCheckIn, RosterRepository, SettingsRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    AttendanceSummary, AttendeeId, AttendeeStatus, CheckInConflict, CheckInKey, CheckInRecord,
    Event, EventId, RegistrationStatus, RosterEntry,
};
use crate::remote::{
    with_timeout, CheckInCallback, CommitOutcome, RemoteResult, RemoteStore, Subscription,
};

/// Event/attendee repository shared by the validator and the sync coordinator
pub struct CheckInRepository<S> {
    remote: Arc<S>,
    db: Arc<Mutex<Database>>,
    cache: Arc<StdMutex<RosterCache>>,
    watch: Arc<StdMutex<Option<Subscription>>>,
    device_id: String,
    remote_timeout: Duration,
    commit_timeout: Duration,
}

impl<S> Clone for CheckInRepository<S> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            db: Arc::clone(&self.db),
            cache: Arc::clone(&self.cache),
            watch: Arc::clone(&self.watch),
            device_id: self.device_id.clone(),
            remote_timeout: self.remote_timeout,
            commit_timeout: self.commit_timeout,
        }
    }
}

fn lock_cache(cache: &StdMutex<RosterCache>) -> MutexGuard<'_, RosterCache> {
    cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl<S: RemoteStore> CheckInRepository<S> {
    /// Wrap an opened database; loads or creates this device's id
    pub async fn new(remote: Arc<S>, db: Database, config: &EngineConfig) -> Result<Self> {
        let device_id = LibSqlSettingsRepository::new(db.connection())
            .device_id()
            .await?;

        Ok(Self {
            remote,
            db: Arc::new(Mutex::new(db)),
            cache: Arc::new(StdMutex::new(RosterCache::default())),
            watch: Arc::new(StdMutex::new(None)),
            device_id,
            remote_timeout: config.remote_timeout(),
            commit_timeout: config.commit_timeout(),
        })
    }

    /// Stable identifier stamped on this device's check-ins
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn remote(&self) -> &S {
        &self.remote
    }

    fn cache(&self) -> MutexGuard<'_, RosterCache> {
        lock_cache(&self.cache)
    }

    /// Fetch an event, falling back to the local copy when the remote store
    /// is unreachable
    pub async fn fetch_event(&self, event_id: &EventId) -> Result<Event> {
        match with_timeout(self.remote_timeout, self.remote.fetch_event(event_id)).await {
            Ok(Some(event)) => {
                let db = self.db.lock().await;
                LibSqlRosterRepository::new(db.connection())
                    .save_event(&event)
                    .await?;
                Ok(event)
            }
            Ok(None) => Err(Error::NotFound(format!("event {event_id}"))),
            Err(error) if error.is_transient() => {
                warn!(event_id = %event_id, %error, "Remote unavailable, using cached event");
                let db = self.db.lock().await;
                LibSqlRosterRepository::new(db.connection())
                    .load_event(event_id)
                    .await?
                    .ok_or(Error::Remote(error))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Local-only status lookup used on the scan path
    pub fn cached_attendee_status(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> AttendeeStatus {
        self.cache()
            .status(event_id, attendee_id)
            .unwrap_or(AttendeeStatus::Unregistered)
    }

    /// Cached status, reading through to the remote store on a miss.
    ///
    /// Used for organizer lookups outside the scan loop; validation only
    /// consults [`Self::cached_attendee_status`].
    pub async fn fetch_attendee_status(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> Result<AttendeeStatus> {
        if let Some(status) = self.cache().status(event_id, attendee_id) {
            return Ok(status);
        }

        let entry = match self.read_through(event_id, attendee_id).await {
            Ok(entry) => entry,
            Err(error) if error.is_transient() => {
                warn!(
                    event_id = %event_id,
                    attendee_id = %attendee_id,
                    %error,
                    "Remote unavailable, attendee status unknown"
                );
                return Ok(AttendeeStatus::Unregistered);
            }
            Err(error) => return Err(error.into()),
        };

        let status = entry.status();
        {
            let db = self.db.lock().await;
            LibSqlRosterRepository::new(db.connection())
                .upsert_entry(event_id, &entry)
                .await?;
        }
        self.cache().upsert(event_id, entry);
        Ok(status)
    }

    async fn read_through(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> RemoteResult<RosterEntry> {
        let registration = with_timeout(
            self.remote_timeout,
            self.remote.fetch_registration(event_id, attendee_id),
        )
        .await?;
        let key = CheckInKey::new(event_id.clone(), attendee_id.clone());
        let check_in =
            with_timeout(self.remote_timeout, self.remote.fetch_check_in(&key)).await?;
        let attendee =
            with_timeout(self.remote_timeout, self.remote.fetch_attendee(attendee_id)).await?;

        Ok(RosterEntry {
            attendee_id: attendee_id.clone(),
            display_name: attendee.map(|attendee| attendee.display_name),
            registration: registration.unwrap_or_default(),
            checked_in: check_in.is_some(),
        })
    }

    /// Atomically flip the cached attendee to checked-in.
    ///
    /// Returns `false` when the attendee is not registered-not-checked-in,
    /// including when another scan won the race.
    pub fn try_mark_checked_in(&self, event_id: &EventId, attendee_id: &AttendeeId) -> bool {
        self.cache().try_mark_checked_in(event_id, attendee_id)
    }

    /// Undo [`Self::try_mark_checked_in`] after a failed enqueue
    pub fn rollback_check_in(&self, event_id: &EventId, attendee_id: &AttendeeId) {
        self.cache().set_checked_in(event_id, attendee_id, false);
    }

    /// Append a record to the local pending-write queue
    pub async fn enqueue_check_in(&self, record: &CheckInRecord) -> Result<i64> {
        let db = self.db.lock().await;
        let seq = LibSqlQueueRepository::new(db.connection())
            .append(record)
            .await?;

        if let Err(error) = LibSqlRosterRepository::new(db.connection())
            .set_checked_in(&record.event_id, &record.attendee_id, true)
            .await
        {
            warn!(check_in = %record.key(), %error, "Failed to persist roster flag");
        }

        debug!(check_in = %record.key(), seq, "Enqueued check-in");
        Ok(seq)
    }

    /// Create-if-absent commit of one record, bounded by the commit timeout
    pub async fn commit_check_in(&self, record: &CheckInRecord) -> RemoteResult<CommitOutcome> {
        with_timeout(self.commit_timeout, self.remote.create_check_in(record)).await
    }

    /// Load the roster of `event_id` into the cache.
    ///
    /// Pulls registrations and remote check-ins when the remote store is
    /// reachable and persists them; otherwise uses the persisted roster.
    /// Local queue entries always count as checked in. Returns the number of
    /// cached entries.
    pub async fn prime_roster(&self, event_id: &EventId) -> Result<usize> {
        let remote_roster =
            with_timeout(self.remote_timeout, self.remote.fetch_roster(event_id)).await;

        let db = self.db.lock().await;
        let roster_repo = LibSqlRosterRepository::new(db.connection());

        let mut entries = match remote_roster {
            Ok(entries) => {
                roster_repo.replace_roster(event_id, &entries).await?;
                entries
            }
            Err(error) if error.is_transient() => {
                warn!(event_id = %event_id, %error, "Remote unavailable, using persisted roster");
                roster_repo.load_roster(event_id).await?
            }
            Err(error) => return Err(error.into()),
        };

        let queued = LibSqlQueueRepository::new(db.connection())
            .list_for_event(event_id)
            .await?;
        drop(db);

        for QueuedCheckIn { record, .. } in queued {
            match entries
                .iter_mut()
                .find(|entry| entry.attendee_id == record.attendee_id)
            {
                Some(entry) => entry.checked_in = true,
                None => entries.push(RosterEntry {
                    attendee_id: record.attendee_id,
                    display_name: None,
                    registration: RegistrationStatus::Waiting,
                    checked_in: true,
                }),
            }
        }

        let count = entries.len();
        self.cache().load(event_id, entries);
        info!(event_id = %event_id, entries = count, "Roster primed");
        Ok(count)
    }

    /// Follow remote check-ins of `event_id`, replacing any previous watch
    pub fn watch_event(&self, event_id: &EventId) -> bool {
        self.unwatch();

        let cache = Arc::clone(&self.cache);
        let callback: CheckInCallback = Arc::new(move |record: &CheckInRecord| {
            lock_cache(&cache).set_checked_in(&record.event_id, &record.attendee_id, true);
        });

        let subscription = self.remote.subscribe(event_id, callback);
        let watching = subscription.is_some();
        if watching {
            debug!(event_id = %event_id, "Watching remote check-ins");
        }
        *self
            .watch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = subscription;
        watching
    }

    pub fn unwatch(&self) {
        let subscription = self
            .watch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            self.remote.unsubscribe(&subscription);
            debug!(event_id = %subscription.event_id, "Stopped watching remote check-ins");
        }
    }

    /// Records still waiting for the remote store, after `after_seq`
    pub async fn pending_batch(&self, after_seq: i64, limit: usize) -> Result<Vec<QueuedCheckIn>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_pending(after_seq, limit)
            .await
    }

    /// The remote store accepted the record: drop it from the queue
    pub async fn mark_synced(&self, queued: &QueuedCheckIn) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .remove(queued.seq)
            .await
    }

    /// Another device won: keep the record for audit and align the cache
    pub async fn mark_conflict(
        &self,
        queued: &QueuedCheckIn,
        remote: &CheckInRecord,
    ) -> Result<CheckInConflict> {
        let conflict = {
            let db = self.db.lock().await;
            LibSqlQueueRepository::new(db.connection())
                .resolve_conflict(queued.seq, &queued.record, remote)
                .await?
        };
        self.cache()
            .set_checked_in(&remote.event_id, &remote.attendee_id, true);
        Ok(conflict)
    }

    /// Leave the record pending and remember the failure
    pub async fn record_failure(&self, queued: &QueuedCheckIn, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .record_failure(queued.seq, error)
            .await
    }

    /// Attendance counts for the organizer view.
    ///
    /// `synced` comes from the remote store when reachable; otherwise it is
    /// estimated from the cached roster.
    pub async fn attendance_summary(&self, event_id: &EventId) -> Result<AttendanceSummary> {
        let (pending, conflicts) = {
            let db = self.db.lock().await;
            LibSqlQueueRepository::new(db.connection())
                .count_by_state(event_id)
                .await?
        };

        let synced =
            match with_timeout(self.remote_timeout, self.remote.list_check_ins(event_id)).await {
                Ok(records) => records.len(),
                Err(error) if error.is_transient() => {
                    warn!(event_id = %event_id, %error, "Remote unavailable, estimating attendance");
                    self.local_checked_in_count(event_id)
                        .await?
                        .saturating_sub(pending)
                }
                Err(error) => return Err(error.into()),
            };

        Ok(AttendanceSummary {
            event_id: event_id.clone(),
            synced,
            pending,
            conflicts,
        })
    }

    /// Checked-in attendees known on this device: the live cache when it
    /// holds the event, otherwise the roster persisted by an earlier run
    async fn local_checked_in_count(&self, event_id: &EventId) -> Result<usize> {
        let cached = {
            let cache = self.cache();
            cache
                .is_loaded_for(event_id)
                .then(|| cache.checked_in_count(event_id))
        };
        if let Some(count) = cached {
            return Ok(count);
        }

        let db = self.db.lock().await;
        let roster = LibSqlRosterRepository::new(db.connection())
            .load_roster(event_id)
            .await?;
        Ok(roster.iter().filter(|entry| entry.checked_in).count())
    }

    /// Locally held records of an event, pending and conflicted
    pub async fn local_check_ins(&self, event_id: &EventId) -> Result<Vec<CheckInRecord>> {
        let db = self.db.lock().await;
        Ok(LibSqlQueueRepository::new(db.connection())
            .list_for_event(event_id)
            .await?
            .into_iter()
            .map(|queued| queued.record)
            .collect())
    }

    /// Most recently resolved conflicts first
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<CheckInConflict>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }

    /// Organizer reset: delete every remote and local check-in of an event.
    ///
    /// Requires the remote store; nothing local is touched when it fails.
    /// Returns the number of remote records deleted.
    pub async fn reset_event(&self, event_id: &EventId) -> Result<u64> {
        let removed =
            with_timeout(self.remote_timeout, self.remote.delete_check_ins(event_id)).await?;

        let local = {
            let db = self.db.lock().await;
            let local = LibSqlQueueRepository::new(db.connection())
                .delete_for_event(event_id)
                .await?;
            LibSqlRosterRepository::new(db.connection())
                .clear_checked_in(event_id)
                .await?;
            local
        };
        self.cache().clear_checked_in(event_id);

        info!(event_id = %event_id, removed, local, "Event check-ins reset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attendee;
    use crate::remote::MemoryRemoteStore;
    use pretty_assertions::assert_eq;

    fn event_id() -> EventId {
        "evt1".parse().unwrap()
    }

    fn attendee(id: &str) -> AttendeeId {
        id.parse().unwrap()
    }

    fn seeded_remote() -> MemoryRemoteStore {
        let remote = MemoryRemoteStore::new();
        remote.insert_event(Event::new(event_id(), "Festival", "org1", 0, i64::MAX));
        remote.insert_attendee(Attendee::new(attendee("usr1"), "Naruto"));
        remote.register(&event_id(), &attendee("usr1"), RegistrationStatus::Accepted);
        remote.register(&event_id(), &attendee("usr2"), RegistrationStatus::Accepted);
        remote.register(&event_id(), &attendee("usr3"), RegistrationStatus::Declined);
        remote
    }

    async fn repository(remote: &MemoryRemoteStore) -> CheckInRepository<MemoryRemoteStore> {
        let db = Database::open_in_memory().await.unwrap();
        CheckInRepository::new(
            Arc::new(remote.clone()),
            db,
            &EngineConfig::with_signing_key("key"),
        )
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_event_falls_back_to_cached_copy() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;

        let event = repo.fetch_event(&event_id()).await.unwrap();
        assert_eq!(event.name, "Festival");

        remote.set_online(false);
        let cached = repo.fetch_event(&event_id()).await.unwrap();
        assert_eq!(cached, event);

        let missing = repo.fetch_event(&"evt9".parse().unwrap()).await.unwrap_err();
        assert!(matches!(missing, Error::Remote(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_event_unknown_is_not_found() {
        let repo = repository(&seeded_remote()).await;
        let error = repo.fetch_event(&"evt9".parse().unwrap()).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn attendee_status_reads_through_and_fills_cache() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        repo.prime_roster(&event_id()).await.unwrap();

        // Registered after the roster was primed
        remote.register(&event_id(), &attendee("late"), RegistrationStatus::Accepted);
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("late")),
            AttendeeStatus::Unregistered
        );
        assert_eq!(
            repo.fetch_attendee_status(&event_id(), &attendee("late"))
                .await
                .unwrap(),
            AttendeeStatus::RegisteredNotCheckedIn
        );
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("late")),
            AttendeeStatus::RegisteredNotCheckedIn
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn attendee_status_offline_miss_is_unregistered() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        remote.set_online(false);

        let status = repo
            .fetch_attendee_status(&event_id(), &attendee("usr1"))
            .await
            .unwrap();
        assert_eq!(status, AttendeeStatus::Unregistered);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn prime_roster_offline_uses_persisted_roster_and_queue() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        assert_eq!(repo.prime_roster(&event_id()).await.unwrap(), 3);

        let record = CheckInRecord::new_pending(event_id(), attendee("usr1"), repo.device_id());
        assert!(repo.try_mark_checked_in(&event_id(), &attendee("usr1")));
        repo.enqueue_check_in(&record).await.unwrap();

        remote.set_online(false);
        repo.prime_roster(&event_id()).await.unwrap();
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("usr1")),
            AttendeeStatus::CheckedIn
        );
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("usr2")),
            AttendeeStatus::RegisteredNotCheckedIn
        );
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("usr3")),
            AttendeeStatus::Unregistered
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_reports_conflicts() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        let first = CheckInRecord::new_pending(event_id(), attendee("usr1"), "dev-a");
        let second = CheckInRecord::new_pending(event_id(), attendee("usr1"), "dev-b");

        assert_eq!(
            repo.commit_check_in(&first).await.unwrap(),
            CommitOutcome::Committed
        );
        assert!(matches!(
            repo.commit_check_in(&second).await.unwrap(),
            CommitOutcome::Conflict(existing) if existing.recorded_by == "dev-a"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watch_event_applies_remote_check_ins() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        repo.prime_roster(&event_id()).await.unwrap();
        assert!(repo.watch_event(&event_id()));

        let other_device = CheckInRecord::new_pending(event_id(), attendee("usr2"), "dev-b");
        remote.create_check_in(&other_device).await.unwrap();
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("usr2")),
            AttendeeStatus::CheckedIn
        );

        repo.unwatch();
        let later = CheckInRecord::new_pending(event_id(), attendee("usr1"), "dev-b");
        remote.create_check_in(&later).await.unwrap();
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("usr1")),
            AttendeeStatus::RegisteredNotCheckedIn
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn attendance_summary_counts_remote_and_local() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        repo.prime_roster(&event_id()).await.unwrap();

        remote
            .create_check_in(&CheckInRecord::new_pending(event_id(), attendee("usr2"), "dev-b"))
            .await
            .unwrap();
        let local = CheckInRecord::new_pending(event_id(), attendee("usr1"), repo.device_id());
        repo.enqueue_check_in(&local).await.unwrap();

        let summary = repo.attendance_summary(&event_id()).await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.conflicts, 0);
        assert_eq!(summary.attendance(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_attendance_uses_persisted_roster_after_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("konoha.db");
        let remote = seeded_remote();
        let config = EngineConfig::with_signing_key("key");

        {
            let db = Database::open(&path).await.unwrap();
            let repo = CheckInRepository::new(Arc::new(remote.clone()), db, &config)
                .await
                .unwrap();
            repo.prime_roster(&event_id()).await.unwrap();
            for id in ["usr1", "usr2"] {
                assert!(repo.try_mark_checked_in(&event_id(), &attendee(id)));
                let record = CheckInRecord::new_pending(event_id(), attendee(id), repo.device_id());
                repo.enqueue_check_in(&record).await.unwrap();
            }
            for queued in repo.pending_batch(0, 10).await.unwrap() {
                repo.commit_check_in(&queued.record).await.unwrap();
                repo.mark_synced(&queued).await.unwrap();
            }
            assert_eq!(repo.attendance_summary(&event_id()).await.unwrap().synced, 2);
        }

        remote.set_online(false);
        let db = Database::open(&path).await.unwrap();
        let reopened = CheckInRepository::new(Arc::new(remote.clone()), db, &config)
            .await
            .unwrap();

        let summary = reopened.attendance_summary(&event_id()).await.unwrap();
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.attendance(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_event_clears_remote_and_local_state() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        repo.prime_roster(&event_id()).await.unwrap();

        remote
            .create_check_in(&CheckInRecord::new_pending(event_id(), attendee("usr2"), "dev-b"))
            .await
            .unwrap();
        let local = CheckInRecord::new_pending(event_id(), attendee("usr1"), repo.device_id());
        assert!(repo.try_mark_checked_in(&event_id(), &attendee("usr1")));
        repo.enqueue_check_in(&local).await.unwrap();

        assert_eq!(repo.reset_event(&event_id()).await.unwrap(), 1);
        assert!(remote.check_ins_for(&event_id()).is_empty());
        assert!(repo.local_check_ins(&event_id()).await.unwrap().is_empty());
        assert_eq!(
            repo.cached_attendee_status(&event_id(), &attendee("usr1")),
            AttendeeStatus::RegisteredNotCheckedIn
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_event_requires_remote() {
        let remote = seeded_remote();
        let repo = repository(&remote).await;
        let local = CheckInRecord::new_pending(event_id(), attendee("usr1"), repo.device_id());
        repo.enqueue_check_in(&local).await.unwrap();

        remote.set_online(false);
        assert!(repo.reset_event(&event_id()).await.is_err());
        assert_eq!(repo.local_check_ins(&event_id()).await.unwrap().len(), 1);
    }
}
