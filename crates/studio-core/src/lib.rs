//! # studio-core
//!
//! Shared vocabulary for the Studio command bridge.
//!
//! - **Branded IDs**: [`CommandId`] and [`SessionId`] newtypes (UUID v7)
//! - **Wire protocol**: [`StudioCommand`] handed to the plugin, [`StudioResponse`]
//!   posted back by it
//! - **Errors**: [`BridgeError`] taxonomy via `thiserror`
//! - **Tool names**: snake_case to plugin PascalCase mapping
//! - **Logging**: `tracing` subscriber setup and capture helpers for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod tools;

pub use errors::BridgeError;
pub use ids::{CommandId, SessionId};
pub use protocol::{ResponseAck, StudioCommand, StudioResponse};
