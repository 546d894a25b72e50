//! Bridge process client.
//!
//! [`BridgeClient`] launches the vendor bridge as a child process with
//! `kill_on_drop(true)` and exchanges newline-delimited JSON over its
//! stdio: lifecycle events flow in through the reader task, commands flow
//! out through the writer task, and `message/send` calls are correlated
//! with their acknowledgements by UUID.
//!
//! The child is respawned lazily by [`ProtocolClient::initialize`] when the
//! previous process has exited, so a bridge crash recovers through the same
//! debounced reconnect path as an ordinary disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{reader, writer, ClientEvent, ProtocolClient};
use crate::config::BridgeConfig;
use crate::{AppError, Result};

/// Thread-safe map of pending send acknowledgement senders keyed by the
/// outbound correlation ID.
pub type PendingSends =
    Arc<Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value>>>>>;

/// Grace period for the bridge process to exit after `session/stop` before
/// it is force-killed.
const DESTROY_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the outbound writer channel.
const WRITER_QUEUE: usize = 32;

/// Active stdio link to a running bridge process.
struct BridgeLink {
    /// Outbound message channel consumed by the writer task.
    writer_tx: mpsc::Sender<serde_json::Value>,
    /// Child process handle — kept alive so `kill_on_drop` works.
    child: Child,
    /// Cancels the reader/writer/stderr tasks for this link.
    cancel: CancellationToken,
}

/// Production [`ProtocolClient`] backed by a bridge child process.
pub struct BridgeClient {
    config: BridgeConfig,
    send_ack: Duration,
    events: mpsc::Sender<ClientEvent>,
    pending: PendingSends,
    link: Mutex<Option<BridgeLink>>,
}

impl BridgeClient {
    /// Create a client that will launch the bridge described by `config`
    /// and emit lifecycle events into `events`.
    #[must_use]
    pub fn new(config: BridgeConfig, send_ack: Duration, events: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            config,
            send_ack,
            events,
            pending: Arc::new(Mutex::new(HashMap::new())),
            link: Mutex::new(None),
        }
    }

    /// Return a writer handle to a live bridge process, respawning the
    /// child if the previous one has exited.
    async fn ensure_link(&self) -> Result<mpsc::Sender<serde_json::Value>> {
        let mut link = self.link.lock().await;

        let stale = match link.as_mut() {
            None => true,
            Some(l) => l.writer_tx.is_closed() || l.child.try_wait().ok().flatten().is_some(),
        };

        if stale {
            if let Some(mut old) = link.take() {
                old.cancel.cancel();
                let _ = old.child.start_kill();
            }
            *link = Some(self.spawn_link()?);
        }

        link.as_ref().map_or_else(
            || Err(AppError::Transport("bridge link unavailable".into())),
            |l| Ok(l.writer_tx.clone()),
        )
    }

    /// Spawn the bridge process and wire up its reader/writer tasks.
    fn spawn_link(&self) -> Result<BridgeLink> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);

        if let Some(ref dir) = self.config.data_dir {
            cmd.env("COURIER_DATA_DIR", dir);
        }

        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Transport(format!("failed to spawn bridge: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Transport("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Transport("failed to capture bridge stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Transport("failed to capture bridge stderr".into()))?;

        let cancel = CancellationToken::new();
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE);

        tokio::spawn(writer::run_writer(stdin, writer_rx, cancel.clone()));
        tokio::spawn(reader::run_reader(
            stdout,
            self.events.clone(),
            Arc::clone(&self.pending),
            cancel.clone(),
        ));

        // Forward bridge stderr into our logs for diagnostics.
        let stderr_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                tokio::select! {
                    () = stderr_cancel.cancelled() => break,
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(text)) => debug!(target: "bridge", "{text}"),
                            _ => break,
                        }
                    }
                }
            }
        });

        info!(command = %self.config.command, "bridge process spawned");

        Ok(BridgeLink {
            writer_tx,
            child,
            cancel,
        })
    }
}

impl ProtocolClient for BridgeClient {
    fn initialize(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let writer_tx = self.ensure_link().await?;
            writer_tx
                .send(serde_json::json!({
                    "method": "session/start",
                    "params": {},
                }))
                .await
                .map_err(|_| AppError::Transport("bridge stdin closed".into()))
        })
    }

    fn send<'a>(
        &'a self,
        target: &'a str,
        body: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value>> + Send + 'a>>
    {
        Box::pin(async move {
            let writer_tx = {
                let link = self.link.lock().await;
                link.as_ref()
                    .map(|l| l.writer_tx.clone())
                    .ok_or_else(|| AppError::Transport("bridge not running".into()))?
            };

            let id = uuid::Uuid::new_v4().to_string();
            let (ack_tx, ack_rx) = oneshot::channel();
            self.pending.lock().await.insert(id.clone(), ack_tx);

            let message = serde_json::json!({
                "method": "message/send",
                "id": id,
                "params": { "chat_id": target, "body": body },
            });

            if writer_tx.send(message).await.is_err() {
                self.pending.lock().await.remove(&id);
                return Err(AppError::Transport("bridge stdin closed".into()));
            }

            match tokio::time::timeout(self.send_ack, ack_rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(AppError::Send(
                    "bridge closed before acknowledging send".into(),
                )),
                Err(_elapsed) => {
                    self.pending.lock().await.remove(&id);
                    Err(AppError::Send("bridge did not acknowledge send in time".into()))
                }
            }
        })
    }

    fn destroy(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = self.link.lock().await;
            let Some(mut link) = guard.take() else {
                // The benign shutdown race: the transport is already gone.
                return Err(AppError::Transport("bridge already closed".into()));
            };

            // Ask politely first; the write may fail if the process died.
            let _ = link
                .writer_tx
                .send(serde_json::json!({
                    "method": "session/stop",
                    "params": {},
                }))
                .await;

            link.cancel.cancel();

            match tokio::time::timeout(DESTROY_GRACE, link.child.wait()).await {
                Ok(Ok(status)) => {
                    info!(?status, "bridge process exited");
                }
                Ok(Err(err)) => {
                    warn!(%err, "error waiting for bridge process");
                }
                Err(_elapsed) => {
                    warn!("bridge did not exit within grace period, forcing kill");
                    if let Err(err) = link.child.kill().await {
                        warn!(%err, "failed to force-kill bridge process");
                    }
                }
            }

            Ok(())
        })
    }
}
