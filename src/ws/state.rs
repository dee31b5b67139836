//! Probe state machine.
//!
//! [`ProbeMachine`] owns every decision the probe makes: when the command
//! may be sent, how a frame is classified, and whether a timer firing
//! actually closes the connection. It performs no I/O, so the transport loop
//! in [`super::connection`] only has to execute what it is told.
//!
//! ```text
//! Connecting ──open──▶ Open ──close requested──▶ Closing ──▶ Closed
//!      │                 │  ╲
//!      └──── error ──────┴───╲── server closed ───────────▶ Closed
//!                 ▼
//!              Failed
//! ```

use serde::Serialize;

use super::messages::{ResponseMessage, Verdict};
use crate::error::ProbeError;

/// Lifecycle of the single probe connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    /// Handshake in progress.
    Connecting,
    /// Handshake done; command sent; waiting for replies.
    Open,
    /// Our close frame is out; waiting for the server to finish.
    Closing,
    /// Connection is gone.
    Closed,
    /// Transport failed before the probe could close cleanly.
    Failed,
}

/// Why the connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Grace delay after an inbound frame elapsed.
    GraceDelay,
    /// Watchdog fired with the connection still open.
    Watchdog,
    /// The server closed first.
    ServerClosed,
}

/// What a single inbound frame turned out to be.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The frame matched a classification rule.
    Classified {
        /// The verdict the frame carries.
        verdict: Verdict,
        /// `true` if this frame set the probe's verdict; later matches are
        /// logged but do not override the first.
        first: bool,
    },
    /// Valid JSON object that matched no rule.
    Unclassified,
    /// The payload could not be decoded.
    Malformed(ProbeError),
}

/// Result of feeding one inbound frame to the machine.
#[derive(Debug)]
pub struct FrameDecision {
    /// Parsed message, when the frame was a JSON object.
    pub message: Option<ResponseMessage>,
    /// Classification result.
    pub outcome: FrameOutcome,
    /// Whether the grace timer should be (re)armed.
    pub arm_close: bool,
}

/// Summary of a finished probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// State the connection ended in.
    pub state: ProbeState,
    /// First classified reply, if any.
    pub verdict: Option<Verdict>,
    /// Number of data frames received.
    pub frames_received: usize,
    /// Number of command messages sent. Never more than one.
    pub commands_sent: usize,
    /// Why the connection was closed, if it closed.
    pub close_reason: Option<CloseReason>,
    /// Last transport error, rendered for logging.
    pub error: Option<String>,
}

impl ProbeReport {
    /// `true` when the server gave a recognizable answer to `auth`, whether
    /// acceptance or the expected token rejection.
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        self.verdict.is_some()
    }
}

/// Pure state machine behind a probe run.
#[derive(Debug)]
pub struct ProbeMachine {
    state: ProbeState,
    verdict: Option<Verdict>,
    frames_received: usize,
    commands_sent: usize,
    close_reason: Option<CloseReason>,
    error: Option<String>,
}

impl Default for ProbeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeMachine {
    /// Creates a machine in [`ProbeState::Connecting`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ProbeState::Connecting,
            verdict: None,
            frames_received: 0,
            commands_sent: 0,
            close_reason: None,
            error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProbeState {
        self.state
    }

    /// Transport reported the connection open.
    ///
    /// Returns `true` exactly once per machine: the caller must send the
    /// command then and only then.
    pub fn opened(&mut self) -> bool {
        if self.state != ProbeState::Connecting || self.commands_sent > 0 {
            return false;
        }
        self.state = ProbeState::Open;
        self.commands_sent = 1;
        true
    }

    /// Feeds one inbound data frame, already decoded to text.
    pub fn on_frame(&mut self, payload: Result<&str, ProbeError>) -> FrameDecision {
        self.frames_received += 1;
        let arm_close = self.state == ProbeState::Open;

        let parsed = payload.and_then(ResponseMessage::parse);
        let (message, outcome) = match parsed {
            Ok(message) => {
                let outcome = match message.classify() {
                    Some(verdict) => {
                        let first = self.verdict.is_none();
                        if first {
                            self.verdict = Some(verdict);
                        }
                        FrameOutcome::Classified { verdict, first }
                    }
                    None => FrameOutcome::Unclassified,
                };
                (Some(message), outcome)
            }
            Err(err) => (None, FrameOutcome::Malformed(err)),
        };

        FrameDecision {
            message,
            outcome,
            arm_close,
        }
    }

    /// Asks to close the connection.
    ///
    /// Returns `true` only on the transition out of [`ProbeState::Open`];
    /// every other call is a no-op.
    pub fn request_close(&mut self, reason: CloseReason) -> bool {
        if self.state != ProbeState::Open {
            return false;
        }
        self.state = ProbeState::Closing;
        self.close_reason = Some(reason);
        true
    }

    /// Watchdog expiry. Closes only if the connection is still open.
    pub fn on_watchdog(&mut self) -> bool {
        self.request_close(CloseReason::Watchdog)
    }

    /// The connection is gone (close handshake finished, stream ended, or
    /// our wait for the handshake timed out).
    pub fn on_closed(&mut self) {
        match self.state {
            ProbeState::Open => {
                self.state = ProbeState::Closed;
                self.close_reason = Some(CloseReason::ServerClosed);
            }
            ProbeState::Closing | ProbeState::Connecting => self.state = ProbeState::Closed,
            ProbeState::Closed | ProbeState::Failed => {}
        }
    }

    /// Transport error. Fails the probe unless a close was already under way.
    pub fn on_error(&mut self, err: &ProbeError) {
        match self.state {
            ProbeState::Connecting | ProbeState::Open => {
                self.state = ProbeState::Failed;
                self.error = Some(err.to_string());
            }
            ProbeState::Closing => {
                self.state = ProbeState::Closed;
                self.error = Some(err.to_string());
            }
            ProbeState::Closed | ProbeState::Failed => {}
        }
    }

    /// Snapshot of the run so far.
    #[must_use]
    pub fn report(&self) -> ProbeReport {
        ProbeReport {
            state: self.state,
            verdict: self.verdict,
            frames_received: self.frames_received,
            commands_sent: self.commands_sent,
            close_reason: self.close_reason,
            error: self.error.clone(),
        }
    }
}
