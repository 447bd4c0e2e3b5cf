//! Periodic idle-session sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use studio_core::SessionId;

use super::registry::ConnectionRegistry;

/// Flag every session idle for longer than `threshold`, arming a `grace`
/// eviction timer for each one not already in its grace period. Returns the
/// newly flagged ids.
pub fn sweep_idle(
    registry: &Arc<ConnectionRegistry>,
    threshold: Duration,
    grace: Duration,
) -> Vec<SessionId> {
    registry
        .sessions()
        .into_iter()
        .filter_map(|session| {
            let idle = session.idle_for();
            (idle > threshold && registry.flag_idle(session.id(), idle, grace))
                .then(|| session.id().clone())
        })
        .collect()
}

/// Run [`sweep_idle`] every `interval` until cancelled.
pub async fn run_idle_sweeper(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    threshold: Duration,
    grace: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = time::interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let flagged = sweep_idle(&registry, threshold, grace);
                if !flagged.is_empty() {
                    debug!(count = flagged.len(), "idle sessions flagged");
                }
            }
            () = cancel.cancelled() => {
                debug!("idle sweeper stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::connection::session::{ClientSession, Outbound};

    const THRESHOLD: Duration = Duration::from_secs(300);
    const GRACE: Duration = Duration::from_secs(60);

    fn register(
        registry: &ConnectionRegistry,
        id: &str,
    ) -> (Arc<ClientSession>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Arc::new(ClientSession::new(SessionId::from(id), tx));
        let _ = registry.register(Arc::clone(&session));
        (session, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_flags_only_idle_sessions() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_quiet, _rx1) = register(&registry, "quiet");
        let (chatty, _rx2) = register(&registry, "chatty");

        time::advance(Duration::from_secs(301)).await;
        chatty.touch();

        let flagged = sweep_idle(&registry, THRESHOLD, GRACE);
        assert_eq!(flagged, vec![SessionId::from("quiet")]);
        assert!(registry.has_pending_eviction(&SessionId::from("quiet")));
        assert!(!registry.has_pending_eviction(&SessionId::from("chatty")));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_sweeps_do_not_rearm_grace() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_quiet, _rx1) = register(&registry, "quiet");

        time::advance(Duration::from_secs(301)).await;
        assert_eq!(sweep_idle(&registry, THRESHOLD, GRACE).len(), 1);
        time::advance(Duration::from_secs(30)).await;
        assert!(sweep_idle(&registry, THRESHOLD, GRACE).is_empty());

        // Evicted 60s after the first flag, not after the second sweep.
        time::sleep(Duration::from_secs(31)).await;
        assert!(!registry.contains(&SessionId::from("quiet")));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_loop_evicts_idle_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = register(&registry, "quiet");
        let cancel = CancellationToken::new();

        let sweeper = tokio::spawn(run_idle_sweeper(
            Arc::clone(&registry),
            Duration::from_secs(30),
            THRESHOLD,
            GRACE,
            cancel.clone(),
        ));

        // First sweep past the threshold is at 330s; eviction at 390s.
        time::sleep(Duration::from_secs(389)).await;
        assert!(registry.contains(session.id()));
        time::sleep(Duration::from_secs(2)).await;
        assert!(!registry.contains(session.id()));
        assert!(session.is_terminated());

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn activity_during_grace_keeps_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = register(&registry, "quiet");

        time::advance(Duration::from_secs(301)).await;
        assert_eq!(sweep_idle(&registry, THRESHOLD, GRACE).len(), 1);

        time::sleep(Duration::from_secs(10)).await;
        assert!(registry.touch(session.id()));
        time::sleep(Duration::from_secs(120)).await;
        assert!(registry.contains(session.id()));
    }
}
