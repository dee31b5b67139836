//! Probe error types.
//!
//! [`ProbeError`] covers everything that can go wrong while the probe talks
//! to the server. None of these escape [`crate::ws::run_probe`]: each one is
//! logged and folded into the final [`crate::ws::ProbeReport`].

use tokio_tungstenite::tungstenite;

/// Errors raised while driving a probe connection.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The WebSocket handshake could not be completed.
    #[error("connect to {url} failed: {source}")]
    Connect {
        /// Endpoint the probe tried to reach.
        url: String,
        /// Underlying transport error.
        #[source]
        source: tungstenite::Error,
    },

    /// The transport failed after the connection was established.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The outbound command could not be serialized.
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound frame was not a JSON object.
    #[error("failed to parse message: {0}")]
    Parse(#[source] serde_json::Error),

    /// An inbound binary frame was not valid UTF-8.
    #[error("binary frame is not valid UTF-8 ({len} bytes)")]
    NonUtf8Binary {
        /// Length of the rejected payload.
        len: usize,
    },
}

/// Errors raised while loading [`crate::config::ProbeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `PROBE_URL` does not look like a plain WebSocket URL.
    #[error("invalid probe url {0:?}: expected ws://host:port/path")]
    InvalidUrl(String),
}
