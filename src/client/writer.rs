//! Bridge writer task.
//!
//! Receives outbound JSON messages from a tokio [`mpsc`] channel, serialises
//! each value to a single-line JSON string, and writes the NDJSON line to
//! the bridge's `stdin` using [`tokio::io::AsyncWriteExt`].

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Bridge writer task — serialises outbound JSON messages and writes to
/// `stdin`.
///
/// Each [`serde_json::Value`] received from `msg_rx` becomes one compact
/// `\n`-terminated line. The task exits cleanly when `cancel` fires or when
/// `msg_rx` closes (all senders dropped).
///
/// # Errors
///
/// - [`AppError::Transport`]`("failed to serialise outbound message: …")`
///   if serialisation fails (should not occur for `Value`).
/// - [`AppError::Transport`]`("write failed: …")` if the write to `stdin`
///   fails (e.g. the bridge process has exited).
pub async fn run_writer(
    stdin: ChildStdin,
    mut msg_rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("bridge writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!("bridge writer: message channel closed, stopping");
                    break;
                };

                let mut buf = serde_json::to_vec(&value).map_err(|e| {
                    AppError::Transport(format!("failed to serialise outbound message: {e}"))
                })?;
                buf.push(b'\n');

                if let Err(e) = stdin.write_all(&buf).await {
                    warn!(error = %e, "bridge writer: write failed, stopping");
                    return Err(AppError::Transport(format!("write failed: {e}")));
                }
                if let Err(e) = stdin.flush().await {
                    warn!(error = %e, "bridge writer: flush failed, stopping");
                    return Err(AppError::Transport(format!("write failed: {e}")));
                }
            }
        }
    }

    Ok(())
}
