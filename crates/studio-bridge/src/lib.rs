//! # studio-bridge
//!
//! Asynchronous command/response correlation for an agent that can only be
//! reached by having it pull for work.
//!
//! - [`CommandQueue`]: FIFO of outbound commands with long-poll wakeups
//! - [`DeadlineTable`]: keyed entries that settle exactly once, either
//!   explicitly or when their deadline fires
//! - [`CommandBridge`]: ties the two together. Callers submit a command and
//!   await a [`PendingCommand`]; the plugin polls for work and posts responses.

#![deny(unsafe_code)]

pub mod bridge;
pub mod deadline;
pub mod queue;

pub use bridge::{BridgeConfig, BridgeStats, CommandBridge, DeliveryOutcome, PendingCommand};
pub use deadline::DeadlineTable;
pub use queue::CommandQueue;
