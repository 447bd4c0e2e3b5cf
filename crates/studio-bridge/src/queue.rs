//! FIFO command queue with long-poll wakeups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use studio_core::StudioCommand;
use studio_core::constants::{BRIDGE_POLLERS_WAITING, BRIDGE_QUEUE_DEPTH};

/// Outbound commands waiting for the plugin to pull them.
///
/// Every push wakes all parked pollers; each re-checks the queue and exactly
/// one wins each command. Losers go back to waiting, but never past their own
/// deadline.
#[derive(Default)]
pub struct CommandQueue {
    items: Mutex<VecDeque<StudioCommand>>,
    notify: Notify,
    waiting: AtomicUsize,
    closed: AtomicBool,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command and wake every parked poller. Returns the new depth.
    pub fn push(&self, command: StudioCommand) -> usize {
        let depth = {
            let mut items = self.items.lock();
            items.push_back(command);
            items.len()
        };
        record_depth(depth);
        self.notify.notify_waiters();
        depth
    }

    /// Pop the head of the queue without waiting.
    pub fn try_pop(&self) -> Option<StudioCommand> {
        let mut items = self.items.lock();
        let command = items.pop_front();
        if command.is_some() {
            record_depth(items.len());
        }
        command
    }

    /// Pop the head of the queue, waiting up to `max_wait` for one to arrive.
    ///
    /// Returns `None` when the window elapses empty or the queue is closed.
    pub async fn pop_wait(&self, max_wait: Duration) -> Option<StudioCommand> {
        self.pop_until(Instant::now() + max_wait).await
    }

    /// Pop the head of the queue, waiting until `deadline` at the latest.
    pub async fn pop_until(&self, deadline: Instant) -> Option<StudioCommand> {
        loop {
            if self.is_closed() {
                return None;
            }

            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();

            if let Some(command) = self.try_pop() {
                return Some(command);
            }
            if self.is_closed() {
                return None;
            }

            let _parked = ParkedPoller::new(&self.waiting);
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return if self.is_closed() {
                    None
                } else {
                    self.try_pop()
                };
            }
        }
    }

    /// Remove every queued command. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut items = self.items.lock();
            let n = items.len();
            items.clear();
            n
        };
        record_depth(0);
        dropped
    }

    /// Close the queue, releasing every parked poller with `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Commands currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no command is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Pollers currently parked on an empty queue.
    pub fn waiting_pollers(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_depth(depth: usize) {
    gauge!(BRIDGE_QUEUE_DEPTH).set(depth as f64);
}

struct ParkedPoller<'a> {
    count: &'a AtomicUsize,
}

impl<'a> ParkedPoller<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        let _ = count.fetch_add(1, Ordering::Relaxed);
        gauge!(BRIDGE_POLLERS_WAITING).increment(1.0);
        Self { count }
    }
}

impl Drop for ParkedPoller<'_> {
    fn drop(&mut self) {
        let _ = self.count.fetch_sub(1, Ordering::Relaxed);
        gauge!(BRIDGE_POLLERS_WAITING).decrement(1.0);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn cmd(tool: &str) -> StudioCommand {
        StudioCommand::new(tool, json!({}))
    }

    #[test]
    fn fifo_order() {
        let q = CommandQueue::new();
        let _ = q.push(cmd("A"));
        let _ = q.push(cmd("B"));
        assert_eq!(q.push(cmd("C")), 3);

        assert_eq!(q.try_pop().unwrap().tool, "A");
        assert_eq!(q.try_pop().unwrap().tool, "B");
        assert_eq!(q.try_pop().unwrap().tool, "C");
        assert!(q.try_pop().is_none());
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pop_wait_returns_immediately_when_non_empty() {
        let q = CommandQueue::new();
        let _ = q.push(cmd("A"));
        let start = Instant::now();
        assert_eq!(q.pop_wait(Duration::from_secs(15)).await.unwrap().tool, "A");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_wait_times_out_empty() {
        let q = CommandQueue::new();
        let start = Instant::now();
        assert!(q.pop_wait(Duration::from_millis(500)).await.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(q.waiting_pollers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_wait_wakes_on_push() {
        let q = Arc::new(CommandQueue::new());
        let poller = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.pop_wait(Duration::from_secs(15)).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(q.waiting_pollers(), 1);
        let _ = q.push(cmd("Late"));

        let got = poller.await.unwrap().unwrap();
        assert_eq!(got.tool, "Late");
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_command_goes_to_exactly_one_poller() {
        let q = Arc::new(CommandQueue::new());
        let pollers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                tokio::spawn(async move { q.pop_wait(Duration::from_secs(1)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(q.waiting_pollers(), 3);
        let _ = q.push(cmd("Only"));

        let results = futures::future::join_all(pollers).await;
        let winners = results
            .into_iter()
            .map(Result::unwrap)
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn losers_do_not_wait_past_deadline() {
        let q = Arc::new(CommandQueue::new());
        let start = Instant::now();
        let pollers: Vec<_> = (0..2)
            .map(|_| {
                let q = Arc::clone(&q);
                tokio::spawn(async move { q.pop_wait(Duration::from_millis(300)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = q.push(cmd("X"));

        let _ = futures::future::join_all(pollers).await;
        assert!(start.elapsed() <= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn close_releases_pollers() {
        let q = Arc::new(CommandQueue::new());
        let poller = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.pop_wait(Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let start = Instant::now();
        q.close();
        assert!(poller.await.unwrap().is_none());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(q.pop_wait(Duration::from_secs(1)).await.is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let q = CommandQueue::new();
        let _ = q.push(cmd("A"));
        let _ = q.push(cmd("B"));
        assert_eq!(q.clear(), 2);
        assert_eq!(q.len(), 0);
    }
}
