//! WebSocket probe: wire messages, state machine, and transport loop.
//!
//! The probe opens one connection to the game server's `/ws` endpoint,
//! sends a single `auth` command, and reports how the server answered.

pub mod connection;
pub mod messages;
pub mod state;

pub use connection::run_probe;
pub use messages::{CommandMessage, ResponseMessage, Verdict};
pub use state::{CloseReason, ProbeMachine, ProbeReport, ProbeState};
