//! Per-client push session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use studio_core::SessionId;

/// A frame queued for the session's socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(Arc<String>),
    /// A heartbeat ping.
    Ping,
}

/// A connected push client.
///
/// The transport handle is the outbound channel plus a close token: the
/// socket tasks stop once [`terminate`](Self::terminate) cancels the token.
pub struct ClientSession {
    id: SessionId,
    tx: mpsc::Sender<Outbound>,
    close: CancellationToken,
    close_reason: Mutex<Option<String>>,
    registered_at: Mutex<Instant>,
    last_activity: Mutex<Instant>,
    missed_heartbeats: AtomicU32,
    dropped_messages: AtomicU64,
}

impl ClientSession {
    /// Create a session writing to `tx`.
    pub fn new(id: SessionId, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            close: CancellationToken::new(),
            close_reason: Mutex::new(None),
            registered_at: Mutex::new(now),
            last_activity: Mutex::new(now),
            missed_heartbeats: AtomicU32::new(0),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Queue a text frame. Returns `false` (and counts a drop) when the
    /// channel is full or closed.
    pub fn send(&self, message: Arc<String>) -> bool {
        self.enqueue(Outbound::Text(message))
    }

    /// Serialize `value` and queue it as a text frame.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Queue a heartbeat ping.
    pub fn ping(&self) -> bool {
        self.enqueue(Outbound::Ping)
    }

    fn enqueue(&self, frame: Outbound) -> bool {
        if self.is_terminated() {
            return false;
        }
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Frames dropped because the writer could not keep up.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// When the session was (last) registered.
    pub fn registered_at(&self) -> Instant {
        *self.registered_at.lock()
    }

    pub(crate) fn mark_registered(&self) {
        let now = Instant::now();
        *self.registered_at.lock() = now;
        *self.last_activity.lock() = now;
    }

    /// Count one unanswered heartbeat round. Returns the new total.
    pub fn record_missed_heartbeat(&self) -> u32 {
        self.missed_heartbeats.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reset the missed-heartbeat counter (pong received).
    pub fn reset_heartbeats(&self) {
        self.missed_heartbeats.store(0, Ordering::Release);
    }

    /// Consecutive unanswered heartbeat rounds.
    pub fn missed_heartbeats(&self) -> u32 {
        self.missed_heartbeats.load(Ordering::Acquire)
    }

    /// Close the transport. The first reason given is kept.
    pub fn terminate(&self, reason: &str) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_owned());
            }
        }
        self.close.cancel();
    }

    /// Whether the transport has been closed.
    pub fn is_terminated(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Why the transport was closed, if it was.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }

    /// Resolves once the transport is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }

    /// Token cancelled when the transport is closed.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Time since registration.
    pub fn age(&self) -> Duration {
        self.registered_at.lock().elapsed()
    }
}
