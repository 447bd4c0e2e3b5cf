//! Command dispatcher and response correlator.
//!
//! A caller submits a command and receives a [`PendingCommand`] future. The
//! waiter is registered before the command becomes visible in the queue, so
//! even an instant response finds it. The plugin pulls commands through
//! [`CommandBridge::poll_for_command`] and posts results to
//! [`CommandBridge::deliver_response`]. Each command settles exactly once:
//! with the delivered value, the delivered error, or a timeout.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use studio_core::constants::{
    BRIDGE_COMMAND_DURATION_SECONDS, BRIDGE_COMMANDS_DISPATCHED_TOTAL,
    BRIDGE_COMMANDS_SETTLED_TOTAL, BRIDGE_COMMANDS_SUBMITTED_TOTAL,
    BRIDGE_UNKNOWN_RESPONSES_TOTAL,
};
use studio_core::tools::studio_tool_name;
use studio_core::{BridgeError, CommandId, StudioCommand, StudioResponse};

use crate::deadline::DeadlineTable;
use crate::queue::CommandQueue;

/// Bridge timing configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Default deadline for a submitted command.
    pub command_timeout: Duration,
    /// Default long-poll window.
    pub poll_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(15),
        }
    }
}

/// What happened to a delivered response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The response settled a live waiter.
    Settled,
    /// No live waiter: unknown id, already settled, or timed out.
    Unknown,
}

type Outcome = Result<String, BridgeError>;

struct Waiter {
    tx: oneshot::Sender<Outcome>,
    tool: String,
    submitted_at: Instant,
}

impl Waiter {
    fn settle(self, outcome: Outcome, label: &'static str) {
        counter!(BRIDGE_COMMANDS_SETTLED_TOTAL, "outcome" => label).increment(1);
        histogram!(BRIDGE_COMMAND_DURATION_SECONDS).record(self.submitted_at.elapsed().as_secs_f64());
        // The caller may have stopped listening; nothing to do then.
        let _ = self.tx.send(outcome);
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    resolved: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    unknown_responses: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time bridge counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    /// Commands accepted by `submit_command`.
    pub submitted: u64,
    /// Commands handed to the plugin.
    pub dispatched: u64,
    /// Commands settled with a delivered value.
    pub resolved: u64,
    /// Commands settled with a delivered error.
    pub failed: u64,
    /// Commands whose deadline fired first.
    pub timed_out: u64,
    /// Commands abandoned by their caller.
    pub cancelled: u64,
    /// Responses that matched no live waiter.
    pub unknown_responses: u64,
    /// Waiters currently live.
    pub pending: usize,
    /// Commands currently queued.
    pub queued: usize,
    /// Pollers currently parked.
    pub waiting_pollers: usize,
}

/// The command/response correlation bridge.
pub struct CommandBridge {
    config: BridgeConfig,
    queue: CommandQueue,
    waiters: DeadlineTable<CommandId, Waiter>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl CommandBridge {
    /// Create a bridge with the given timing.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            queue: CommandQueue::new(),
            waiters: DeadlineTable::new(),
            counters: Arc::new(Counters::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Timing configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Submit a command using the configured deadline.
    pub fn submit_command(&self, tool: &str, args: Value) -> Result<PendingCommand, BridgeError> {
        self.submit_command_with_timeout(tool, args, self.config.command_timeout)
    }

    /// Submit a command with an explicit deadline.
    ///
    /// Fails synchronously on a malformed command or a closed bridge, without
    /// touching the queue. Snake_case tool names are mapped to the plugin's
    /// names.
    #[instrument(skip(self, args), fields(command_id))]
    pub fn submit_command_with_timeout(
        &self,
        tool: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<PendingCommand, BridgeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::Closed);
        }
        let tool = tool.trim();
        if tool.is_empty() {
            return Err(BridgeError::validation("tool name must not be empty"));
        }
        if !(args.is_object() || args.is_null()) {
            return Err(BridgeError::validation("args must be a JSON object"));
        }
        let args = if args.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            args
        };

        let command = StudioCommand::new(studio_tool_name(tool), args);
        let id = command.id.clone();
        let _ = tracing::Span::current().record("command_id", id.as_str());

        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            tx,
            tool: command.tool.clone(),
            submitted_at: Instant::now(),
        };

        let counters = Arc::clone(&self.counters);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let _ = self.waiters.insert(id.clone(), waiter, timeout, move |id, waiter| {
            Counters::bump(&counters.timed_out);
            warn!(command_id = %id, tool = %waiter.tool, timeout_ms, "command timed out");
            waiter.settle(Err(BridgeError::Timeout { timeout_ms }), "timeout");
        });

        counter!(BRIDGE_COMMANDS_SUBMITTED_TOTAL, "tool" => command.tool.clone()).increment(1);
        Counters::bump(&self.counters.submitted);
        let depth = self.queue.push(command);
        debug!(command_id = %id, depth, "command queued");

        // Lost a race with close(): fail now instead of at the deadline.
        if self.is_closed() {
            if let Some(waiter) = self.waiters.settle(&id) {
                waiter.settle(Err(BridgeError::Closed), "closed");
            }
        }

        Ok(PendingCommand {
            id,
            rx,
            waiters: Some(self.waiters.clone()),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Pull the next command for the plugin, waiting up to `max_wait`.
    ///
    /// Commands whose caller already gave up (timed out or dropped) are
    /// discarded rather than dispatched.
    pub async fn poll_for_command(&self, max_wait: Duration) -> Option<StudioCommand> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let command = self.queue.pop_until(deadline).await?;
            if !self.waiters.contains(&command.id) {
                debug!(command_id = %command.id, "discarding command with no live waiter");
                continue;
            }
            Counters::bump(&self.counters.dispatched);
            counter!(BRIDGE_COMMANDS_DISPATCHED_TOTAL).increment(1);
            debug!(command_id = %command.id, tool = %command.tool, "command dispatched");
            return Some(command);
        }
    }

    /// Pull the next command using the configured poll window.
    pub async fn poll(&self) -> Option<StudioCommand> {
        self.poll_for_command(self.config.poll_timeout).await
    }

    /// Settle the waiter for `response.id`, if it is still live.
    ///
    /// Unknown or already-settled ids are logged and acknowledged; they never
    /// affect other waiters.
    pub fn deliver_response(&self, response: StudioResponse) -> DeliveryOutcome {
        let Some(waiter) = self.waiters.settle(&response.id) else {
            Counters::bump(&self.counters.unknown_responses);
            counter!(BRIDGE_UNKNOWN_RESPONSES_TOTAL).increment(1);
            let err = BridgeError::UnknownCorrelation {
                id: response.id.to_text(),
            };
            warn!(error = %err, "discarding response");
            return DeliveryOutcome::Unknown;
        };

        let id = response.id.clone();
        let outcome = response.into_outcome();
        let label = if let Err(e) = &outcome {
            Counters::bump(&self.counters.failed);
            info!(command_id = %id, tool = %waiter.tool, error = %e, "command failed in plugin");
            "failed"
        } else {
            Counters::bump(&self.counters.resolved);
            debug!(command_id = %id, tool = %waiter.tool, "command resolved");
            "resolved"
        };
        waiter.settle(outcome, label);
        DeliveryOutcome::Settled
    }

    /// Validate an untyped response body, then deliver it.
    pub fn deliver_value(&self, body: &Value) -> Result<DeliveryOutcome, BridgeError> {
        let response = StudioResponse::from_value(body)?;
        Ok(self.deliver_response(response))
    }

    /// Shut the bridge down: reject new submissions, release parked pollers,
    /// drop queued commands and fail every pending caller with
    /// [`BridgeError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();
        let dropped = self.queue.clear();
        let pending = self.waiters.drain();
        let failed = pending.len();
        for (_, waiter) in pending {
            waiter.settle(Err(BridgeError::Closed), "closed");
        }
        info!(dropped, failed, "command bridge closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Live waiters.
    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }

    /// Queued commands.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the bridge counters.
    pub fn stats(&self) -> BridgeStats {
        let c = &self.counters;
        BridgeStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            unknown_responses: c.unknown_responses.load(Ordering::Relaxed),
            pending: self.waiters.len(),
            queued: self.queue.len(),
            waiting_pollers: self.queue.waiting_pollers(),
        }
    }
}

impl Default for CommandBridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

/// A submitted command awaiting its response.
///
/// Dropping it before it resolves removes the waiter and cancels the deadline.
#[must_use = "dropping a PendingCommand abandons the command"]
pub struct PendingCommand {
    id: CommandId,
    rx: oneshot::Receiver<Outcome>,
    waiters: Option<DeadlineTable<CommandId, Waiter>>,
    counters: Arc<Counters>,
}

impl PendingCommand {
    /// Correlation id of the command.
    pub fn id(&self) -> &CommandId {
        &self.id
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("id", &self.id)
            .field("live", &self.waiters.is_some())
            .finish()
    }
}

impl Future for PendingCommand {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => {
                self.waiters = None;
                Poll::Ready(result.unwrap_or(Err(BridgeError::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        let Some(waiters) = self.waiters.take() else {
            return;
        };
        if waiters.cancel(&self.id).is_some() {
            Counters::bump(&self.counters.cancelled);
            counter!(BRIDGE_COMMANDS_SETTLED_TOTAL, "outcome" => "cancelled").increment(1);
            debug!(command_id = %self.id, "pending command abandoned by caller");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
