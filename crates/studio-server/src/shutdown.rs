//! Shutdown: one cancellation token shared by every background task, plus a
//! bounded drain of the tasks the server tracks.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long [`ShutdownCoordinator::drain`] waits when no grace is given.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Which tracked tasks stopped on their own and which had to be aborted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks that finished within the grace period.
    pub finished: Vec<&'static str>,
    /// Tasks aborted when the grace period ran out.
    pub aborted: Vec<&'static str>,
}

/// Owns the server's cancellation token and its long-running tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Fresh coordinator with nothing tracked.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token that fires when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track a background task so [`drain`](Self::drain) waits for it.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Number of tracked tasks not yet drained.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Fire the token. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            debug!("shutdown triggered");
        }
        self.token.cancel();
    }

    /// Whether [`trigger`](Self::trigger) has run.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait for every tracked task, sharing one
    /// deadline `grace` from now. Tasks still running at the deadline are
    /// aborted.
    pub async fn drain(&self, grace: Option<Duration>) -> DrainReport {
        self.trigger();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let deadline = Instant::now() + grace.unwrap_or(DEFAULT_DRAIN_GRACE);
        info!(tasks = tasks.len(), "draining background tasks");

        let mut report = DrainReport::default();
        for (name, mut handle) in tasks {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_ok() {
                report.finished.push(name);
            } else {
                warn!(task = name, "task still running at shutdown deadline, aborting");
                handle.abort();
                report.aborted.push(name);
            }
        }
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Process signal that asked the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

/// Wait for SIGINT, or SIGTERM on Unix.
///
/// A signal that cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> StopSignal {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => StopSignal::Interrupt,
        () = terminate => StopSignal::Terminate,
    }
}

// ─── Tests ───
