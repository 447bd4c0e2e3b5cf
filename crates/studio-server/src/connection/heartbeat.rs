//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::{ConnectionRegistry, EvictionReason};
use super::session::ClientSession;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client left too many pings unanswered.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Ping a session every `interval` until it stops answering.
///
/// Each tick counts one unanswered round before sending the ping; a pong
/// resets the count through [`ClientSession::reset_heartbeats`]. The loop
/// returns [`HeartbeatResult::TimedOut`] on the first tick where the count
/// exceeds `max_missed`, so a silent client survives `max_missed` rounds and
/// is dropped on the next one.
pub async fn run_heartbeat(
    session: Arc<ClientSession>,
    interval: Duration,
    max_missed: u32,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticks = time::interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let missed = session.record_missed_heartbeat();
                if missed > max_missed {
                    return HeartbeatResult::TimedOut;
                }
                if !session.ping() {
                    debug!(session_id = %session.id(), "heartbeat ping not queued");
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

/// Spawn the heartbeat for a registered session. A timeout evicts the
/// session; closing the session stops the task.
pub fn spawn_heartbeat(
    registry: Arc<ConnectionRegistry>,
    session: Arc<ClientSession>,
    interval: Duration,
    max_missed: u32,
) -> JoinHandle<HeartbeatResult> {
    tokio::spawn(async move {
        let cancel = session.close_token();
        let result = run_heartbeat(Arc::clone(&session), interval, max_missed, cancel).await;
        if result == HeartbeatResult::TimedOut {
            if !registry.evict_session(&session, EvictionReason::HeartbeatTimeout) {
                session.terminate(EvictionReason::HeartbeatTimeout.as_str());
            }
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::SessionId;
    use tokio::sync::mpsc;

    use crate::connection::session::Outbound;

    fn make_session() -> (Arc<ClientSession>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientSession::new(SessionId::from("hb"), tx)), rx)
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let (session, _rx) = make_session();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        let handle = tokio::spawn(async move {
            run_heartbeat(session, Duration::from_secs(100), 3, cancel2).await
        });

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out_on_round_after_threshold() {
        let (session, mut rx) = make_session();
        let start = Instant::now();

        let result = run_heartbeat(
            Arc::clone(&session),
            Duration::from_secs(30),
            3,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(120));

        let mut pings = 0;
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame, Outbound::Ping);
            pings += 1;
        }
        assert_eq!(pings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn answering_client_stays_alive() {
        let (session, mut rx) = make_session();
        let cancel = CancellationToken::new();

        let handle = {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            tokio::spawn(async move { run_heartbeat(session, Duration::from_secs(30), 3, cancel).await })
        };

        // Answer every ping.
        let responder = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if frame == Outbound::Ping {
                        session.reset_heartbeats();
                    }
                }
            })
        };

        time::sleep(Duration::from_secs(600)).await;
        assert!(!handle.is_finished());
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
        responder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_heartbeat_evicts_silent_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = make_session();
        let _ = registry.register(Arc::clone(&session));

        let handle = spawn_heartbeat(
            Arc::clone(&registry),
            Arc::clone(&session),
            Duration::from_secs(30),
            3,
        );

        // Three silent rounds are tolerated.
        time::sleep(Duration::from_secs(91)).await;
        assert!(registry.contains(session.id()));

        assert_eq!(handle.await.unwrap(), HeartbeatResult::TimedOut);
        assert!(!registry.contains(session.id()));
        assert!(session.is_terminated());
        assert_eq!(registry.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_session_stops_heartbeat() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = make_session();
        let _ = registry.register(Arc::clone(&session));

        let handle = spawn_heartbeat(
            Arc::clone(&registry),
            Arc::clone(&session),
            Duration::from_secs(30),
            3,
        );
        session.terminate("client disconnected");
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
        assert_eq!(registry.stats().failed, 0);
    }
}
