//! Scan sessions.
//!
//! A session binds one event to one detector and one frame stream. Frames
//! are decoded and validated one at a time on a single task; results flow
//! back to the UI over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Error;
use crate::models::{CheckInRecord, EventId};
use crate::remote::RemoteStore;
use crate::scan::{BarcodeDetector, DecodeOutcome, Frame, ScanDecoder};
use crate::validator::{CheckInValidator, RejectReason, ScanOutcome};

const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Per-scan feedback delivered to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Recorded(CheckInRecord),
    Rejected(RejectReason),
    /// The detector could not start; the session has ended
    DecodeUnavailable(String),
}

impl From<ScanOutcome> for ScanResult {
    fn from(outcome: ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::Recorded(record) => Self::Recorded(record),
            ScanOutcome::Rejected(reason) => Self::Rejected(reason),
        }
    }
}

/// UI side of a running session
#[derive(Debug)]
pub struct ScanSessionHandle {
    event_id: EventId,
    results: mpsc::Receiver<ScanResult>,
}

impl ScanSessionHandle {
    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Next scan result; `None` once the session has ended
    pub async fn next_result(&mut self) -> Option<ScanResult> {
        self.results.recv().await
    }

    /// Non-blocking variant of [`Self::next_result`]
    pub fn try_next_result(&mut self) -> Option<ScanResult> {
        self.results.try_recv().ok()
    }
}

/// Engine side of a running session
pub(crate) struct ActiveSession {
    pub(crate) event_id: EventId,
    stop: watch::Sender<bool>,
    finished: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    pub(crate) fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Signal the pipeline and wait for it to wind down
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "Scan session task ended abnormally");
        }
        info!(event_id = %self.event_id, "Scan session stopped");
    }
}

/// Spawn the scan pipeline for `validator`'s event
pub(crate) fn spawn<S, D>(
    validator: CheckInValidator<S>,
    detector: D,
    frames: mpsc::Receiver<Frame>,
) -> (ActiveSession, ScanSessionHandle)
where
    S: RemoteStore,
    D: BarcodeDetector + 'static,
{
    let event_id = validator.event_id().clone();
    let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);

    let finished = Arc::new(AtomicBool::new(false));

    let done = Arc::clone(&finished);
    let task = tokio::spawn(async move {
        run(validator, detector, frames, &results_tx, stop_rx).await;
        // Mark the session over before the UI can observe the closed channel
        done.store(true, Ordering::Release);
        drop(results_tx);
    });
    info!(event_id = %event_id, "Scan session started");

    (
        ActiveSession {
            event_id: event_id.clone(),
            stop: stop_tx,
            finished,
            task,
        },
        ScanSessionHandle {
            event_id,
            results: results_rx,
        },
    )
}

async fn run<S, D>(
    validator: CheckInValidator<S>,
    detector: D,
    mut frames: mpsc::Receiver<Frame>,
    results: &mpsc::Sender<ScanResult>,
    mut stop: watch::Receiver<bool>,
) where
    S: RemoteStore,
    D: BarcodeDetector,
{
    let mut decoder = match ScanDecoder::open(detector) {
        Ok(decoder) => decoder,
        Err(error) => {
            let message = match error {
                Error::DecodeUnavailable(message) => message,
                other => other.to_string(),
            };
            let _ = results.send(ScanResult::DecodeUnavailable(message)).await;
            return;
        }
    };

    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.changed() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => {
                    debug!("Frame stream ended");
                    break;
                }
            },
        };

        let DecodeOutcome::Payload(payload) = decoder.decode(&frame) else {
            continue;
        };

        // Once a payload is decoded the attempt runs to completion
        let outcome = validator.process(&payload).await;

        // A UI that stopped reading must not keep the pipeline alive
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            sent = results.send(outcome.into()) => {
                if sent.is_err() {
                    debug!("Session results receiver dropped");
                    break;
                }
            }
        }
    }
}
