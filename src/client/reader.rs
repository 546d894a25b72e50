//! Bridge reader task.
//!
//! Reads newline-delimited JSON messages from the bridge's stdout, parses
//! each line into an [`Inbound`] item, forwards lifecycle events through a
//! tokio [`mpsc`] channel, and resolves correlated send acknowledgements.
//!
//! # Known inbound methods
//!
//! | Method                 | Maps to                              |
//! |------------------------|--------------------------------------|
//! | `pairing/code`         | [`ClientEvent::PairingCode`]         |
//! | `session/authenticated`| [`ClientEvent::Authenticated`]       |
//! | `session/ready`        | [`ClientEvent::Ready`]               |
//! | `session/auth_failure` | [`ClientEvent::AuthFailure`]         |
//! | `session/disconnected` | [`ClientEvent::Disconnected`]        |
//! | `session/error`        | [`ClientEvent::Error`]               |
//! | `send/result`          | resolves the matching pending send   |
//! | *(any other)*          | Skipped; logged at `DEBUG`           |

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::bridge::PendingSends;
use crate::client::codec::WireCodec;
use crate::client::ClientEvent;
use crate::{AppError, Result};

// ── Inbound message types ─────────────────────────────────────────────────────

/// Top-level bridge message envelope (bridge → gateway).
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    /// Message type identifier (e.g., `session/ready`).
    method: String,
    /// Correlation ID; required for `send/result`.
    id: Option<String>,
    /// Method-specific payload.
    #[serde(default)]
    params: serde_json::Value,
}

/// Parameters for the `pairing/code` method.
#[derive(Debug, Deserialize)]
struct PairingParams {
    code: String,
}

/// Parameters for reason-carrying session methods.
#[derive(Debug, Deserialize)]
struct ReasonParams {
    reason: Option<String>,
}

/// Parameters for the `session/error` method.
#[derive(Debug, Deserialize)]
struct ErrorParams {
    message: Option<String>,
}

/// Parameters for the `send/result` method.
#[derive(Debug, Deserialize)]
struct SendResultParams {
    ok: bool,
    response: Option<serde_json::Value>,
    error: Option<String>,
}

/// One parsed line from the bridge stream.
#[derive(Debug)]
pub enum Inbound {
    /// A lifecycle event for the session manager.
    Event(ClientEvent),
    /// An acknowledgement for a previously issued `message/send`.
    SendResult {
        /// Correlation ID of the originating send.
        id: String,
        /// Acknowledgement payload, or the rejection it carried.
        outcome: Result<serde_json::Value>,
    },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse a single NDJSON line from the bridge stream.
///
/// # Return value
///
/// - `Ok(Some(item))` — the line is a recognized, complete message.
/// - `Ok(None)` — the line is empty/whitespace or has an unknown `method`
///   (silently skipped; unknown methods are logged at `DEBUG` level).
///
/// # Errors
///
/// - [`AppError::Transport`]`("malformed json: …")` — not valid JSON.
/// - [`AppError::Transport`]`("missing required field: …")` — recognized
///   method with an absent required field.
pub fn parse_inbound_line(line: &str) -> Result<Option<Inbound>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: WireEnvelope = serde_json::from_str(line)
        .map_err(|e| AppError::Transport(format!("malformed json: {e}")))?;

    match envelope.method.as_str() {
        "pairing/code" => {
            let params: PairingParams = serde_json::from_value(envelope.params).map_err(|e| {
                AppError::Transport(format!("missing required field: pairing/code params: {e}"))
            })?;
            Ok(Some(Inbound::Event(ClientEvent::PairingCode {
                code: params.code,
            })))
        }
        "session/authenticated" => Ok(Some(Inbound::Event(ClientEvent::Authenticated))),
        "session/ready" => Ok(Some(Inbound::Event(ClientEvent::Ready))),
        "session/auth_failure" => {
            let params: ReasonParams = serde_json::from_value(envelope.params).unwrap_or(
                ReasonParams { reason: None },
            );
            Ok(Some(Inbound::Event(ClientEvent::AuthFailure {
                reason: params
                    .reason
                    .unwrap_or_else(|| "authentication failure".to_owned()),
            })))
        }
        "session/disconnected" => {
            let params: ReasonParams = serde_json::from_value(envelope.params).unwrap_or(
                ReasonParams { reason: None },
            );
            Ok(Some(Inbound::Event(ClientEvent::Disconnected {
                reason: params
                    .reason
                    .unwrap_or_else(|| "connection closed".to_owned()),
            })))
        }
        "session/error" => {
            let params: ErrorParams =
                serde_json::from_value(envelope.params).unwrap_or(ErrorParams { message: None });
            Ok(Some(Inbound::Event(ClientEvent::Error {
                message: params
                    .message
                    .unwrap_or_else(|| "unspecified client error".to_owned()),
            })))
        }
        "send/result" => {
            let id = envelope.id.ok_or_else(|| {
                AppError::Transport("missing required field: `id` in send/result envelope".into())
            })?;
            let params: SendResultParams = serde_json::from_value(envelope.params).map_err(|e| {
                AppError::Transport(format!("missing required field: send/result params: {e}"))
            })?;
            let outcome = if params.ok {
                Ok(params.response.unwrap_or(serde_json::Value::Null))
            } else {
                Err(AppError::Send(
                    params.error.unwrap_or_else(|| "send rejected".to_owned()),
                ))
            };
            Ok(Some(Inbound::SendResult { id, outcome }))
        }
        other => {
            debug!(method = other, "bridge reader: skipping unknown inbound method");
            Ok(None)
        }
    }
}

/// Bridge reader task — decodes NDJSON lines and dispatches them.
///
/// Lifecycle events go to `events`; send acknowledgements resolve the
/// matching entry in `pending`. On EOF or an unrecoverable I/O error the
/// task emits [`ClientEvent::Disconnected`], fails every pending send, and
/// returns — the session manager's debounced reconnect takes it from there.
///
/// Malformed or unrecognised lines are logged and skipped — they do **not**
/// terminate the reader task.
///
/// # Cancellation
///
/// Respects `cancel`: when the token fires the reader exits cleanly without
/// emitting a disconnect event.
///
/// # Errors
///
/// Returns `Ok(())` on clean EOF, I/O failure, or cancellation; the error
/// type exists only to satisfy callers joining the task.
pub async fn run_reader<R>(
    stdout: R,
    events: mpsc::Sender<ClientEvent>,
    pending: PendingSends,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, WireCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("bridge reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("bridge reader: EOF detected");
                        stream_lost(&events, &pending, "bridge stream closed").await;
                        break;
                    }

                    Some(Err(AppError::Transport(ref msg))) => {
                        // Framing error (e.g. line too long) — skip the line.
                        warn!(error = msg.as_str(), "bridge reader: framing error, skipping");
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "bridge reader: IO error, stopping");
                        stream_lost(&events, &pending, &format!("bridge stream error: {e}")).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        match parse_inbound_line(&line) {
                            Ok(Some(Inbound::Event(event))) => {
                                if events.send(event).await.is_err() {
                                    debug!("bridge reader: event channel closed, stopping");
                                    break;
                                }
                            }
                            Ok(Some(Inbound::SendResult { id, outcome })) => {
                                resolve_send(&pending, &id, outcome).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(
                                    error = %e,
                                    raw_line = %line,
                                    "bridge reader: parse error, skipping line"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Resolve one pending send with the bridge's acknowledgement.
async fn resolve_send(pending: &PendingSends, id: &str, outcome: Result<serde_json::Value>) {
    let Some(tx) = pending.lock().await.remove(id) else {
        debug!(id, "bridge reader: acknowledgement for unknown or expired send");
        return;
    };
    let _ = tx.send(outcome);
}

/// Propagate a lost stream: disconnect event plus failing all pending sends.
async fn stream_lost(events: &mpsc::Sender<ClientEvent>, pending: &PendingSends, reason: &str) {
    let stranded: Vec<_> = pending.lock().await.drain().collect();
    for (_, tx) in stranded {
        let _ = tx.send(Err(AppError::Send(reason.to_owned())));
    }

    let event = ClientEvent::Disconnected {
        reason: reason.to_owned(),
    };
    if events.send(event).await.is_err() {
        debug!("bridge reader: event channel closed before disconnect could be delivered");
    }
}
