//! # ws-auth-probe
//!
//! Single-shot smoke test for the board game server's WebSocket endpoint.
//!
//! The probe connects, sends one `auth` command with a placeholder token,
//! logs every frame the server sends back, and closes the connection a
//! short grace period after the last frame or when the watchdog expires.
//! An `INVALID_TOKEN` error is the expected answer and counts as a pass.
//!
//! ## Flow
//!
//! ```text
//! connect ──▶ send {"kind":"cmd","type":"auth",…}
//!                 │
//!                 ├── frame ──▶ classify ──▶ re-arm grace timer
//!                 ├── grace timer ──▶ close (once)
//!                 └── watchdog    ──▶ close if still open
//! ```

pub mod config;
pub mod error;
pub mod ws;
