//! Background reconciliation of the pending-write queue.
//!
//! A pass walks the queue in append order and commits each record with
//! create-if-absent semantics. The coordinator only updates or removes
//! queue rows; scans only append them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::db::QueuedCheckIn;
use crate::error::Result;
use crate::models::CheckInConflict;
use crate::remote::{CommitOutcome, RemoteStore};
use crate::repository::CheckInRepository;

/// Observable online/offline flag driving opportunistic sync
#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _receiver) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.sender.send_replace(online);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records accepted by the remote store and removed from the queue
    pub committed: usize,
    /// Records that lost to another device
    pub conflicts: Vec<CheckInConflict>,
    /// Records left pending for a later pass
    pub deferred: usize,
}

impl SyncReport {
    /// Nothing left to do
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.deferred == 0
    }
}

pub struct SyncCoordinator<S> {
    repository: CheckInRepository<S>,
    pass_lock: Mutex<()>,
    batch_size: usize,
    interval: Duration,
}

impl<S: RemoteStore> SyncCoordinator<S> {
    #[must_use]
    pub fn new(repository: CheckInRepository<S>, config: &EngineConfig) -> Self {
        Self {
            repository,
            pass_lock: Mutex::new(()),
            batch_size: usize::try_from(config.sync_batch_size)
                .unwrap_or(usize::MAX)
                .max(1),
            interval: config.sync_interval(),
        }
    }

    /// Run one pass over the pending queue.
    ///
    /// Passes never overlap. After the first transient failure the remaining
    /// records are left untouched and reported as deferred.
    pub async fn run_pass(&self) -> Result<SyncReport> {
        let _pass = self.pass_lock.lock().await;

        let mut report = SyncReport::default();
        let mut cursor = 0;
        let mut remote_down = false;

        loop {
            let batch = self
                .repository
                .pending_batch(cursor, self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = last.seq;

            for queued in &batch {
                if remote_down {
                    report.deferred += 1;
                } else if !self.sync_one(queued, &mut report).await? {
                    remote_down = true;
                }
            }

            if batch.len() < self.batch_size {
                break;
            }
        }

        if report != SyncReport::default() {
            info!(
                committed = report.committed,
                conflicts = report.conflicts.len(),
                deferred = report.deferred,
                "Sync pass finished"
            );
        }
        Ok(report)
    }

    /// Returns `false` when the remote store looks unreachable
    async fn sync_one(&self, queued: &QueuedCheckIn, report: &mut SyncReport) -> Result<bool> {
        let record = &queued.record;
        match self.repository.commit_check_in(record).await {
            Ok(CommitOutcome::Committed) => {
                self.repository.mark_synced(queued).await?;
                debug!(check_in = %record.key(), "Check-in synced");
                report.committed += 1;
            }
            Ok(CommitOutcome::Conflict(remote)) if remote.is_same_write(record) => {
                // Our own earlier write whose acknowledgement was lost
                self.repository.mark_synced(queued).await?;
                debug!(check_in = %record.key(), "Check-in already committed by this device");
                report.committed += 1;
            }
            Ok(CommitOutcome::Conflict(remote)) => {
                warn!(
                    check_in = %record.key(),
                    winner = %remote.recorded_by,
                    "Check-in conflict, keeping remote record"
                );
                let conflict = self.repository.mark_conflict(queued, &remote).await?;
                report.conflicts.push(conflict);
            }
            Err(remote_error) => {
                let transient = remote_error.is_transient();
                warn!(check_in = %record.key(), %remote_error, transient, "Check-in commit failed");
                self.repository
                    .record_failure(queued, &remote_error.to_string())
                    .await?;
                report.deferred += 1;
                return Ok(!transient);
            }
        }
        Ok(true)
    }

    /// Run passes periodically and whenever connectivity comes back, until
    /// `shutdown` flips to `true` or its sender is dropped
    pub fn spawn(
        self: Arc<Self>,
        mut connectivity: watch::Receiver<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut follow_connectivity = true;

            loop {
                let run = tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        false
                    }
                    changed = connectivity.changed(), if follow_connectivity => {
                        if changed.is_err() {
                            follow_connectivity = false;
                            false
                        } else {
                            let online = *connectivity.borrow_and_update();
                            if online {
                                info!("Connectivity restored, syncing");
                            }
                            online
                        }
                    }
                    _ = ticker.tick() => *connectivity.borrow(),
                };

                if run {
                    if let Err(pass_error) = self.run_pass().await {
                        error!(%pass_error, "Sync pass failed");
                    }
                }
            }
            debug!("Sync coordinator stopped");
        })
    }
}
