//! Probe transport loop.
//!
//! Connects, sends the `auth` command, and multiplexes inbound frames, the
//! grace timer and the watchdog on a single task. Every decision is
//! delegated to [`ProbeMachine`]; this module only performs the I/O.

use std::pin::Pin;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{Instant, Sleep, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use super::messages::CommandMessage;
use super::state::{CloseReason, FrameOutcome, ProbeMachine, ProbeReport, ProbeState};
use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// Long fallback timer, started once at probe launch and never cancelled.
#[derive(Debug)]
struct Watchdog {
    timer: Pin<Box<Sleep>>,
    fired: bool,
}

impl Watchdog {
    fn start(config: &ProbeConfig) -> Self {
        Self {
            timer: Box::pin(sleep(config.watchdog)),
            fired: false,
        }
    }
}

/// Runs one probe against `config.url`.
///
/// Never fails: connect errors, transport errors and malformed frames are
/// logged and reflected in the returned [`ProbeReport`].
pub async fn run_probe(config: &ProbeConfig) -> ProbeReport {
    let mut machine = ProbeMachine::new();
    let mut watchdog = Watchdog::start(config);

    tracing::info!(url = %config.url, cid = %config.cid, "starting websocket probe");

    let connect = connect_async(config.url.as_str());
    tokio::pin!(connect);

    let result = loop {
        tokio::select! {
            result = &mut connect => break result,
            () = &mut watchdog.timer, if !watchdog.fired => {
                // Nothing to close yet; `drive` closes as soon as the handshake completes.
                watchdog.fired = true;
                tracing::debug!(state = ?machine.state(), "watchdog fired during handshake");
            }
        }
    };

    match result {
        Ok((ws, response)) => {
            tracing::info!(status = %response.status(), "websocket connection established");
            drive(ws, config, machine, watchdog).await
        }
        Err(source) => {
            let err = ProbeError::Connect {
                url: config.url.clone(),
                source,
            };
            tracing::error!(error = %err, "websocket error");
            machine.on_error(&err);
            finish(&machine)
        }
    }
}

/// Drives an already-open connection until it closes or fails.
async fn drive<S>(
    mut ws: S,
    config: &ProbeConfig,
    mut machine: ProbeMachine,
    mut watchdog: Watchdog,
) -> ProbeReport
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    if machine.opened() {
        let command = CommandMessage::auth(config.token.as_str(), config.cid.as_str());
        let sent = match command.to_json() {
            Ok(json) => {
                tracing::info!(payload = %json, "sending auth command");
                ws.send(Message::text(json)).await.map_err(ProbeError::from)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            tracing::error!(error = %err, "websocket error");
            machine.on_error(&err);
            return finish(&machine);
        }
    }

    let grace = sleep(config.close_delay);
    tokio::pin!(grace);
    let mut grace_armed = false;

    let drain = sleep(config.close_timeout);
    tokio::pin!(drain);

    if watchdog.fired && machine.on_watchdog() {
        tracing::warn!(timeout = ?config.watchdog, "probe timed out during handshake; closing connection");
        begin_close(&mut ws, &mut machine).await;
        drain.as_mut().reset(Instant::now() + config.close_timeout);
    }

    loop {
        let closing = machine.state() == ProbeState::Closing;

        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(message)) => {
                    if handle_message(message, &mut machine) {
                        grace.as_mut().reset(Instant::now() + config.close_delay);
                        grace_armed = true;
                    }
                }
                Some(Err(err)) => {
                    let err = ProbeError::from(err);
                    tracing::error!(error = %err, "websocket error");
                    machine.on_error(&err);
                    break;
                }
                None => {
                    machine.on_closed();
                    break;
                }
            },
            () = &mut grace, if grace_armed => {
                grace_armed = false;
                if machine.request_close(CloseReason::GraceDelay) {
                    tracing::info!("probe finished; closing connection");
                    begin_close(&mut ws, &mut machine).await;
                    drain.as_mut().reset(Instant::now() + config.close_timeout);
                } else {
                    tracing::debug!(state = ?machine.state(), "grace timer fired; already closing");
                }
            },
            () = &mut watchdog.timer, if !watchdog.fired => {
                watchdog.fired = true;
                if machine.on_watchdog() {
                    tracing::warn!(timeout = ?config.watchdog, "probe timed out; closing connection");
                    begin_close(&mut ws, &mut machine).await;
                    drain.as_mut().reset(Instant::now() + config.close_timeout);
                } else {
                    tracing::debug!(state = ?machine.state(), "watchdog fired; nothing to close");
                }
            },
            () = &mut drain, if closing => {
                tracing::debug!(timeout = ?config.close_timeout, "close handshake timed out; dropping connection");
                machine.on_closed();
                break;
            },
        }

        if matches!(machine.state(), ProbeState::Closed | ProbeState::Failed) {
            break;
        }
    }

    finish(&machine)
}

/// Logs and classifies one inbound message. Returns whether the grace timer
/// should be (re)armed.
fn handle_message(message: Message, machine: &mut ProbeMachine) -> bool {
    let decision = match message {
        Message::Text(text) => {
            tracing::info!(payload = %text.as_str(), "received message");
            machine.on_frame(Ok(text.as_str()))
        }
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => {
                tracing::info!(payload = %text, "received binary message");
                machine.on_frame(Ok(text))
            }
            Err(_) => {
                tracing::info!(len = bytes.len(), "received binary message");
                machine.on_frame(Err(ProbeError::NonUtf8Binary { len: bytes.len() }))
            }
        },
        Message::Close(frame) => {
            tracing::info!(frame = ?frame, "server sent close frame");
            return false;
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
            tracing::debug!("control frame ignored");
            return false;
        }
    };

    match &decision.outcome {
        FrameOutcome::Classified {
            verdict,
            first: true,
        } => {
            let cid = decision
                .message
                .as_ref()
                .and_then(|m| m.cid.as_deref())
                .unwrap_or("-");
            tracing::info!(%verdict, cid, "auth reply classified");
        }
        FrameOutcome::Classified {
            verdict,
            first: false,
        } => {
            tracing::info!(%verdict, "additional auth reply; verdict already recorded");
        }
        FrameOutcome::Unclassified => {
            let kind = decision
                .message
                .as_ref()
                .and_then(|m| m.kind.as_deref())
                .unwrap_or("-");
            tracing::info!(kind, "message not classified");
        }
        FrameOutcome::Malformed(err) => {
            tracing::warn!(error = %err, "failed to parse message");
        }
    }

    decision.arm_close
}

/// Sends our close frame. A failure here ends the connection.
async fn begin_close<S>(ws: &mut S, machine: &mut ProbeMachine)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    if let Err(err) = ws.send(Message::Close(None)).await {
        let err = ProbeError::from(err);
        tracing::debug!(error = %err, "close frame not delivered");
        machine.on_error(&err);
    }
}

fn finish(machine: &ProbeMachine) -> ProbeReport {
    let report = machine.report();
    match report.state {
        ProbeState::Failed => tracing::info!(state = ?report.state, "probe aborted"),
        _ => tracing::info!(state = ?report.state, reason = ?report.close_reason, "websocket connection closed"),
    }
    report
}
