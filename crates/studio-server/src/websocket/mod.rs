//! Push-socket transport.

pub mod handler;
pub mod session;

pub use handler::{HandleResult, handle_message};
pub use session::{connection_established, run_ws_session};
