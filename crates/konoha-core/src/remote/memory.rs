//! In-process remote store.
//!
//! Behaves like the hosted document store (create-if-absent check-ins, push
//! subscriptions) and can be switched offline or slowed down to exercise
//! the sync paths. Snapshots let the CLI keep a file-backed store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    CheckInCallback, CommitOutcome, RemoteError, RemoteResult, RemoteStore, Subscription,
};
use crate::error::Result;
use crate::models::{
    Attendee, AttendeeId, CheckInKey, CheckInRecord, Event, EventId, Registration,
    RegistrationStatus, RosterEntry, SyncState,
};

/// Serializable contents of a [`MemoryRemoteStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(default)]
    pub check_ins: Vec<CheckInRecord>,
}

struct MemoryState {
    online: bool,
    latency: Option<Duration>,
    events: BTreeMap<EventId, Event>,
    attendees: BTreeMap<AttendeeId, Attendee>,
    registrations: BTreeMap<(EventId, AttendeeId), RegistrationStatus>,
    check_ins: BTreeMap<CheckInKey, CheckInRecord>,
    subscribers: Vec<(Subscription, CheckInCallback)>,
    next_subscription: u64,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            online: true,
            latency: None,
            events: BTreeMap::new(),
            attendees: BTreeMap::new(),
            registrations: BTreeMap::new(),
            check_ins: BTreeMap::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }
}

/// Shared in-memory store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_snapshot(snapshot: RemoteSnapshot) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for event in snapshot.events {
                state.events.insert(event.id.clone(), event);
            }
            for attendee in snapshot.attendees {
                state.attendees.insert(attendee.id.clone(), attendee);
            }
            for registration in snapshot.registrations {
                state.registrations.insert(
                    (registration.event_id, registration.attendee_id),
                    registration.status,
                );
            }
            for record in snapshot.check_ins {
                state
                    .check_ins
                    .insert(record.key(), record.with_state(SyncState::Synced));
            }
        }
        store
    }

    /// Load a JSON snapshot; a missing file yields an empty store
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let snapshot: RemoteSnapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents as a JSON snapshot
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> RemoteSnapshot {
        let state = self.lock();
        RemoteSnapshot {
            events: state.events.values().cloned().collect(),
            attendees: state.attendees.values().cloned().collect(),
            registrations: state
                .registrations
                .iter()
                .map(|((event_id, attendee_id), status)| Registration {
                    event_id: event_id.clone(),
                    attendee_id: attendee_id.clone(),
                    status: *status,
                })
                .collect(),
            check_ins: state.check_ins.values().cloned().collect(),
        }
    }

    /// Simulate connectivity loss or recovery
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Delay every request, e.g. to trigger commit timeouts
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    pub fn insert_event(&self, event: Event) {
        self.lock().events.insert(event.id.clone(), event);
    }

    pub fn insert_attendee(&self, attendee: Attendee) {
        self.lock().attendees.insert(attendee.id.clone(), attendee);
    }

    pub fn register(&self, event_id: &EventId, attendee_id: &AttendeeId, status: RegistrationStatus) {
        self.lock()
            .registrations
            .insert((event_id.clone(), attendee_id.clone()), status);
    }

    /// Committed check-ins of an event
    #[must_use]
    pub fn check_ins_for(&self, event_id: &EventId) -> Vec<CheckInRecord> {
        self.lock()
            .check_ins
            .values()
            .filter(|record| &record.event_id == event_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking callback cannot leave the maps half-written
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply simulated latency and connectivity before serving a request
    async fn gate(&self) -> RemoteResult<()> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.lock().online {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("remote store is offline".to_string()))
        }
    }

    fn notify(&self, record: &CheckInRecord) {
        let callbacks = self
            .lock()
            .subscribers
            .iter()
            .filter(|(subscription, _)| subscription.event_id == record.event_id)
            .map(|(_, callback)| Arc::clone(callback))
            .collect::<Vec<_>>();

        for callback in callbacks {
            callback(record);
        }
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn fetch_event(&self, event_id: &EventId) -> RemoteResult<Option<Event>> {
        self.gate().await?;
        Ok(self.lock().events.get(event_id).cloned())
    }

    async fn fetch_attendee(&self, attendee_id: &AttendeeId) -> RemoteResult<Option<Attendee>> {
        self.gate().await?;
        Ok(self.lock().attendees.get(attendee_id).cloned())
    }

    async fn fetch_registration(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> RemoteResult<Option<RegistrationStatus>> {
        self.gate().await?;
        Ok(self
            .lock()
            .registrations
            .get(&(event_id.clone(), attendee_id.clone()))
            .copied())
    }

    async fn fetch_roster(&self, event_id: &EventId) -> RemoteResult<Vec<RosterEntry>> {
        self.gate().await?;
        let state = self.lock();

        let mut roster = state
            .registrations
            .iter()
            .filter(|((registered_event, _), _)| registered_event == event_id)
            .map(|((_, attendee_id), status)| RosterEntry {
                attendee_id: attendee_id.clone(),
                display_name: state
                    .attendees
                    .get(attendee_id)
                    .map(|attendee| attendee.display_name.clone()),
                registration: *status,
                checked_in: state
                    .check_ins
                    .contains_key(&CheckInKey::new(event_id.clone(), attendee_id.clone())),
            })
            .collect::<Vec<_>>();

        // Check-ins without a registration row still count as checked in
        for record in state.check_ins.values() {
            if &record.event_id == event_id
                && !roster
                    .iter()
                    .any(|entry| entry.attendee_id == record.attendee_id)
            {
                roster.push(RosterEntry {
                    attendee_id: record.attendee_id.clone(),
                    display_name: None,
                    registration: RegistrationStatus::Waiting,
                    checked_in: true,
                });
            }
        }

        Ok(roster)
    }

    async fn fetch_check_in(&self, key: &CheckInKey) -> RemoteResult<Option<CheckInRecord>> {
        self.gate().await?;
        Ok(self.lock().check_ins.get(key).cloned())
    }

    async fn list_check_ins(&self, event_id: &EventId) -> RemoteResult<Vec<CheckInRecord>> {
        self.gate().await?;
        Ok(self.check_ins_for(event_id))
    }

    async fn create_check_in(&self, record: &CheckInRecord) -> RemoteResult<CommitOutcome> {
        self.gate().await?;

        let committed = {
            let mut state = self.lock();
            let key = record.key();
            if let Some(existing) = state.check_ins.get(&key) {
                return Ok(CommitOutcome::Conflict(existing.clone()));
            }
            let committed = record.clone().with_state(SyncState::Synced);
            state.check_ins.insert(key, committed.clone());
            committed
        };

        self.notify(&committed);
        Ok(CommitOutcome::Committed)
    }

    async fn delete_check_ins(&self, event_id: &EventId) -> RemoteResult<u64> {
        self.gate().await?;
        let mut state = self.lock();
        let before = state.check_ins.len();
        state
            .check_ins
            .retain(|key, _| &key.event_id != event_id);
        Ok(u64::try_from(before - state.check_ins.len()).unwrap_or(u64::MAX))
    }

    fn subscribe(&self, event_id: &EventId, callback: CheckInCallback) -> Option<Subscription> {
        let mut state = self.lock();
        let subscription = Subscription {
            id: state.next_subscription,
            event_id: event_id.clone(),
        };
        state.next_subscription += 1;
        state.subscribers.push((subscription.clone(), callback));
        Some(subscription)
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.lock()
            .subscribers
            .retain(|(existing, _)| existing != subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn event_id() -> EventId {
        "evt1".parse().unwrap()
    }

    fn record(attendee: &str, device: &str) -> CheckInRecord {
        CheckInRecord::new_pending(event_id(), attendee.parse().unwrap(), device)
    }

    #[tokio::test]
    async fn create_is_first_committer_wins() {
        let store = MemoryRemoteStore::new();
        let first = record("usr1", "dev-a");
        let second = record("usr1", "dev-b");

        assert_eq!(
            store.create_check_in(&first).await.unwrap(),
            CommitOutcome::Committed
        );
        match store.create_check_in(&second).await.unwrap() {
            CommitOutcome::Conflict(existing) => {
                assert_eq!(existing.recorded_by, "dev-a");
                assert_eq!(existing.sync_state, SyncState::Synced);
            }
            CommitOutcome::Committed => panic!("second create must conflict"),
        }
        assert_eq!(store.check_ins_for(&event_id()).len(), 1);
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let store = MemoryRemoteStore::new();
        store.set_online(false);
        let error = store.create_check_in(&record("usr1", "dev")).await.unwrap_err();
        assert!(error.is_transient());
        assert!(store.check_ins_for(&event_id()).is_empty());
    }

    #[tokio::test]
    async fn roster_joins_registrations_and_check_ins() {
        let store = MemoryRemoteStore::new();
        let usr1: AttendeeId = "usr1".parse().unwrap();
        let usr2: AttendeeId = "usr2".parse().unwrap();
        store.insert_attendee(Attendee::new(usr1.clone(), "Naruto"));
        store.register(&event_id(), &usr1, RegistrationStatus::Accepted);
        store.register(&event_id(), &usr2, RegistrationStatus::Declined);
        store.create_check_in(&record("usr1", "dev")).await.unwrap();
        store.create_check_in(&record("walkin", "dev")).await.unwrap();

        let roster = store.fetch_roster(&event_id()).await.unwrap();
        assert_eq!(roster.len(), 3);
        let naruto = roster.iter().find(|entry| entry.attendee_id == usr1).unwrap();
        assert!(naruto.checked_in);
        assert_eq!(naruto.display_name.as_deref(), Some("Naruto"));
        let walkin = roster
            .iter()
            .find(|entry| entry.attendee_id.as_str() == "walkin")
            .unwrap();
        assert!(walkin.checked_in);
    }

    #[tokio::test]
    async fn subscribers_receive_commits_until_unsubscribed() {
        let store = MemoryRemoteStore::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let subscription = store
            .subscribe(
                &event_id(),
                Arc::new(move |_record: &CheckInRecord| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.create_check_in(&record("usr1", "dev")).await.unwrap();
        store.unsubscribe(&subscription);
        store.create_check_in(&record("usr2", "dev")).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_check_ins_only_touches_event() {
        let store = MemoryRemoteStore::new();
        store.create_check_in(&record("usr1", "dev")).await.unwrap();
        store
            .create_check_in(&CheckInRecord::new_pending(
                "evt2".parse().unwrap(),
                "usr1".parse().unwrap(),
                "dev",
            ))
            .await
            .unwrap();

        assert_eq!(store.delete_check_ins(&event_id()).await.unwrap(), 1);
        assert_eq!(store.check_ins_for(&"evt2".parse().unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn snapshot_survives_save_and_load() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("remote.json");

        let store = MemoryRemoteStore::new();
        store.insert_event(Event::new(event_id(), "Festival", "org1", 1, 2));
        store.register(&event_id(), &"usr1".parse().unwrap(), RegistrationStatus::Accepted);
        store.create_check_in(&record("usr1", "dev")).await.unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryRemoteStore::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert!(MemoryRemoteStore::load(&tmp.path().join("missing.json"))
            .unwrap()
            .snapshot()
            .events
            .is_empty());
    }
}
