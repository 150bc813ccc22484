//! Cancellable call status polling.
//!
//! While armed, the monitor polls the callee participant's attribute
//! snapshot at a fixed sub-second cadence and classifies it into the
//! call lifecycle state machine. Each change is published on a watch
//! channel and recorded in the call journal. Polling stops the instant
//! a status that ends the answer-wait phase is observed (`active`,
//! `hangup`, `failed`), or when the orchestrator cancels it — no poller
//! outlives the call it serves.

use dialout_records::{CallEventPayload, CallRecorder};
use dialout_telephony::DialingApi;
use dialout_types::CallStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Consecutive poll failures tolerated before the monitor reports the
/// call as failed.
const MAX_POLL_FAILURES: u32 = 5;

/// A running status poller for one callee.
pub struct CallMonitor {
    status_rx: watch::Receiver<CallStatus>,
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

impl CallMonitor {
    /// Arms the monitor. Polling starts immediately; the callee
    /// participant may not be visible yet, which classifies as
    /// `pending`.
    pub fn spawn(
        telephony: Arc<dyn DialingApi>,
        recorder: CallRecorder,
        room: String,
        identity: String,
        poll_interval: Duration,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(CallStatus::Pending);
        let cancel = Arc::new(Notify::new());
        let task = tokio::spawn(poll_loop(
            telephony,
            recorder,
            room,
            identity,
            poll_interval,
            status_tx,
            cancel.clone(),
        ));
        Self {
            status_rx,
            cancel,
            task,
        }
    }

    /// The latest observed status.
    pub fn status(&self) -> CallStatus {
        *self.status_rx.borrow()
    }

    /// Subscribes to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<CallStatus> {
        self.status_rx.clone()
    }

    /// Cancels polling. Idempotent; safe to call after the loop already
    /// stopped on its own. Uses a stored permit so a cancellation
    /// issued while the loop is mid-poll is not lost.
    pub fn stop(&self) {
        self.cancel.notify_one();
    }
}

impl Drop for CallMonitor {
    fn drop(&mut self) {
        // Backstop: the poll task must never outlive the call.
        self.task.abort();
    }
}

/// Waits on a subscribed receiver until a status ends the answer-wait
/// phase, returning that status. Returns `failed` if the monitor went
/// away without reaching one.
pub async fn wait_answer_phase_end(rx: &mut watch::Receiver<CallStatus>) -> CallStatus {
    loop {
        let status = *rx.borrow();
        if status.ends_answer_wait() {
            return status;
        }
        if rx.changed().await.is_err() {
            return CallStatus::Failed;
        }
    }
}

async fn poll_loop(
    telephony: Arc<dyn DialingApi>,
    recorder: CallRecorder,
    room: String,
    identity: String,
    poll_interval: Duration,
    status_tx: watch::Sender<CallStatus>,
    cancel: Arc<Notify>,
) {
    let mut current = CallStatus::Pending;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            () = cancel.notified() => {
                tracing::debug!(room = %room, "status monitor cancelled");
                return;
            }
            () = tokio::time::sleep(poll_interval) => {}
        }

        let observed = match telephony.participant_attributes(&room, &identity).await {
            Ok(Some(attributes)) => {
                failures = 0;
                CallStatus::classify(&attributes)
            }
            Ok(None) => {
                failures = 0;
                // The participant is created as dialing starts; not
                // visible yet classifies as pending.
                CallStatus::Pending
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(room = %room, error = %e, failures, "status poll failed");
                if failures >= MAX_POLL_FAILURES {
                    publish(&status_tx, &recorder, &mut current, CallStatus::Failed).await;
                    return;
                }
                continue;
            }
        };

        // Status only advances: a stale or vanished snapshot never
        // walks the state machine backwards.
        if observed == current || rank(observed) < rank(current) {
            continue;
        }

        publish(&status_tx, &recorder, &mut current, observed).await;

        if current.ends_answer_wait() {
            tracing::debug!(room = %room, status = %current, "status monitor reached a settling state");
            return;
        }
    }
}

async fn publish(
    status_tx: &watch::Sender<CallStatus>,
    recorder: &CallRecorder,
    current: &mut CallStatus,
    next: CallStatus,
) {
    let from = *current;
    *current = next;
    recorder
        .record(CallEventPayload::StatusChanged { from, to: next })
        .await;
    tracing::info!(from = %from, to = %next, "call status changed");
    let _ = status_tx.send(next);
}

fn rank(status: CallStatus) -> u8 {
    match status {
        CallStatus::Pending => 0,
        CallStatus::Ringing => 1,
        CallStatus::Automation => 2,
        CallStatus::Active => 3,
        CallStatus::Hangup => 4,
        CallStatus::Failed => 4,
    }
}
