//! Registry of live push sessions with lifecycle statistics.
//!
//! Statistics are plain atomics so [`ConnectionRegistry::stats`] never
//! blocks. Idle-eviction grace timers share the deadline table used for
//! command waiters: touching a session cancels its pending eviction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use studio_bridge::DeadlineTable;
use studio_core::{BridgeError, SessionId};
use studio_core::constants::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_EVICTIONS_TOTAL,
};

use super::session::ClientSession;

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 256;

/// Why a session was forcibly removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Too many consecutive unanswered heartbeats.
    HeartbeatTimeout,
    /// No activity for the idle threshold plus the grace period.
    Idle,
}

impl EvictionReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Idle => "idle",
        }
    }

    /// The transport failure this eviction reports for `session_id`.
    pub fn into_error(self, session_id: &SessionId) -> BridgeError {
        let reason = match self {
            Self::HeartbeatTimeout => "missed too many heartbeats",
            Self::Idle => "idle past the grace period",
        };
        BridgeError::Transport {
            session_id: session_id.to_text(),
            reason: reason.to_owned(),
        }
    }
}

/// Session lifecycle notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A session was registered.
    Connected {
        /// The session.
        session_id: SessionId,
        /// Whether it replaced a live session with the same id.
        reconnected: bool,
    },
    /// A session was removed.
    Disconnected {
        /// The session.
        session_id: SessionId,
    },
    /// A session crossed the idle threshold and is in its grace period.
    Inactive {
        /// The session.
        session_id: SessionId,
        /// How long it had been idle.
        idle: Duration,
    },
    /// A session was forcibly removed.
    Evicted {
        /// The session.
        session_id: SessionId,
        /// Why.
        reason: EvictionReason,
        /// The transport failure reported for it.
        error: BridgeError,
    },
}

/// Snapshot of connection statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Sessions registered.
    pub connected: u64,
    /// Sessions removed.
    pub disconnected: u64,
    /// Registrations that replaced a live session with the same id.
    pub reconnected: u64,
    /// Forced evictions.
    pub failed: u64,
    /// Timed requests completed.
    pub total_requests: u64,
    /// Mean timed request latency, milliseconds.
    pub average_latency_ms: f64,
    /// Sessions currently live.
    pub current: usize,
}

#[derive(Default)]
struct Counters {
    connected: AtomicU64,
    disconnected: AtomicU64,
    reconnected: AtomicU64,
    failed: AtomicU64,
    total_requests: AtomicU64,
    latency_total_us: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

/// Live push sessions keyed by id.
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, Arc<ClientSession>>,
    counters: Counters,
    request_timers: DashMap<String, Instant>,
    request_seq: AtomicU64,
    evictions: DeadlineTable<SessionId, ()>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: DashMap::new(),
            counters: Counters::default(),
            request_timers: DashMap::new(),
            request_seq: AtomicU64::new(0),
            evictions: DeadlineTable::new(),
            events,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Register a session. Returns `true` when it replaced a live session
    /// with the same id, which is terminated.
    pub fn register(&self, session: Arc<ClientSession>) -> bool {
        let id = session.id().clone();
        session.mark_registered();
        let previous = self.sessions.insert(id.clone(), Arc::clone(&session));
        let _ = self.evictions.cancel(&id);

        bump(&self.counters.connected);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);

        let reconnected = match previous {
            Some(old) if !Arc::ptr_eq(&old, &session) => {
                bump(&self.counters.reconnected);
                old.terminate("replaced by reconnect");
                true
            }
            _ => {
                gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
                false
            }
        };

        info!(session_id = %id, reconnected, current = self.sessions.len(), "session registered");
        self.emit(ConnectionEvent::Connected {
            session_id: id,
            reconnected,
        });
        reconnected
    }

    /// Remove a session and close its transport. Idempotent.
    pub fn unregister(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                self.finish_removal(&session, "unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove `session` only if it is still the registered session for its
    /// id. Used by a transport on exit so a newer session under the same id
    /// is left alone.
    pub fn release(&self, session: &Arc<ClientSession>) -> bool {
        let removed = self
            .sessions
            .remove_if(session.id(), |_, live| Arc::ptr_eq(live, session));
        match removed {
            Some((_, session)) => {
                self.finish_removal(&session, "client disconnected");
                true
            }
            None => false,
        }
    }

    fn finish_removal(&self, session: &Arc<ClientSession>, reason: &str) {
        let _ = self.evictions.cancel(session.id());
        session.terminate(reason);

        bump(&self.counters.disconnected);
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());

        info!(session_id = %session.id(), reason, current = self.sessions.len(), "session unregistered");
        self.emit(ConnectionEvent::Disconnected {
            session_id: session.id().clone(),
        });
    }

    /// Forcibly remove whatever session is registered under `id`. Counts as
    /// a failure; runs at most once per registration.
    pub fn evict(&self, id: &SessionId, reason: EvictionReason) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                self.finish_eviction(&session, reason);
                true
            }
            None => false,
        }
    }

    /// Forcibly remove `session` only if it still owns its id. A newer
    /// session that reconnected under the same id is left alone.
    pub fn evict_session(&self, session: &Arc<ClientSession>, reason: EvictionReason) -> bool {
        let removed = self
            .sessions
            .remove_if(session.id(), |_, live| Arc::ptr_eq(live, session));
        match removed {
            Some((_, session)) => {
                self.finish_eviction(&session, reason);
                true
            }
            None => false,
        }
    }

    fn finish_eviction(&self, session: &Arc<ClientSession>, reason: EvictionReason) {
        let error = reason.into_error(session.id());
        bump(&self.counters.failed);
        counter!(WS_EVICTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        warn!(session_id = %session.id(), code = error.code(), %error, "evicting session");
        self.emit(ConnectionEvent::Evicted {
            session_id: session.id().clone(),
            reason,
            error,
        });
        self.finish_removal(session, reason.as_str());
    }

    /// Record activity on a session, cancelling any pending idle eviction.
    pub fn touch(&self, id: &SessionId) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };
        session.touch();
        if self.evictions.cancel(id).is_some() {
            debug!(session_id = %id, "activity during idle grace, eviction cancelled");
        }
        true
    }

    /// Flag an idle session and arm its grace timer. Returns `false` when
    /// the session is unknown or already in its grace period.
    pub fn flag_idle(self: &Arc<Self>, id: &SessionId, idle: Duration, grace: Duration) -> bool {
        if self.evictions.contains(id) {
            return false;
        }
        let Some(flagged) = self.get(id) else {
            return false;
        };
        let registry = Arc::downgrade(self);
        let flagged = Arc::downgrade(&flagged);
        let _ = self.evictions.insert(id.clone(), (), grace, move |_, ()| {
            let (Some(registry), Some(session)) = (registry.upgrade(), flagged.upgrade()) else {
                return;
            };
            let _ = registry.evict_session(&session, EvictionReason::Idle);
        });
        warn!(
            session_id = %id,
            idle_secs = idle.as_secs(),
            grace_secs = grace.as_secs(),
            "session inactive"
        );
        self.emit(ConnectionEvent::Inactive {
            session_id: id.clone(),
            idle,
        });
        true
    }

    /// Whether an idle eviction is pending for `id`.
    pub fn has_pending_eviction(&self, id: &SessionId) -> bool {
        self.evictions.contains(id)
    }

    /// Look up a live session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<ClientSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Live session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of the live sessions.
    pub fn sessions(&self) -> Vec<Arc<ClientSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Timer key for the next request on `session_id`. The sequence is
    /// registry-wide, so a resumed session never collides with requests
    /// still in flight from the session it replaced.
    pub fn request_key(&self, session_id: &SessionId) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{session_id}:{seq}")
    }

    /// Start timing a request.
    pub fn start_request_timer(&self, request_id: &str) {
        let _ = self
            .request_timers
            .insert(request_id.to_owned(), Instant::now());
    }

    /// Stop timing a request and fold it into the latency average.
    pub fn end_request_timer(&self, request_id: &str) -> Option<Duration> {
        let (_, started) = self.request_timers.remove(request_id)?;
        let elapsed = started.elapsed();
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        bump(&self.counters.total_requests);
        let _ = self
            .counters
            .latency_total_us
            .fetch_add(micros, Ordering::Relaxed);
        Some(elapsed)
    }

    /// Lock-free statistics snapshot.
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> ConnectionStats {
        let c = &self.counters;
        let total_requests = c.total_requests.load(Ordering::Relaxed);
        let latency_us = c.latency_total_us.load(Ordering::Relaxed);
        let average_latency_ms = if total_requests == 0 {
            0.0
        } else {
            latency_us as f64 / total_requests as f64 / 1000.0
        };
        ConnectionStats {
            connected: c.connected.load(Ordering::Relaxed),
            disconnected: c.disconnected.load(Ordering::Relaxed),
            reconnected: c.reconnected.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            total_requests,
            average_latency_ms,
            current: self.sessions.len(),
        }
    }

    /// Zero the cumulative counters. Live sessions are unaffected.
    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [
            &c.connected,
            &c.disconnected,
            &c.reconnected,
            &c.failed,
            &c.total_requests,
            &c.latency_total_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Close every session and drop all timers. Used at shutdown.
    pub fn cleanup(&self) {
        let _ = self.evictions.drain();
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let closed = ids.iter().filter(|id| self.unregister(id)).count();
        self.request_timers.clear();
        info!(closed, "connection registry cleaned up");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
