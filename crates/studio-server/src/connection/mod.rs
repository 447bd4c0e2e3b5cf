//! Push-client connection management: sessions, registry, heartbeat and
//! idle sweep.

pub mod heartbeat;
pub mod registry;
pub mod session;
pub mod sweeper;

pub use heartbeat::{HeartbeatResult, run_heartbeat, spawn_heartbeat};
pub use registry::{ConnectionEvent, ConnectionRegistry, ConnectionStats, EvictionReason};
pub use session::{ClientSession, Outbound};
pub use sweeper::{run_idle_sweeper, sweep_idle};
