//! Session manager: the single owner of session state.
//!
//! [`SessionManager`] mediates every read and write of the lifecycle state,
//! arbitrates reconnection, and resolves suspended senders. Protocol client
//! event callbacks and HTTP-triggered operations both land here and are
//! serialized through one `tokio::sync::Mutex` — no two transitions can
//! interleave.
//!
//! Reconnection is debounced: bursts of disconnect events within the
//! configured window collapse into a single re-initialization attempt, and
//! the timer re-validates both its generation and the current phase at fire
//! time, so a reconnect scheduled before a shutdown (or a ready event) is a
//! no-op.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientEvent, ProtocolClient};
use crate::config::GlobalConfig;
use crate::render::PairingRenderer;
use crate::session::state::{Effects, Phase, SessionState, Wake};
use crate::session::waiters::{WaitOutcome, WaiterRegistry};
use crate::{AppError, Result};

/// Non-blocking snapshot of the session for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Whether messages can be sent right now.
    pub ready: bool,
    /// Whether a pairing code is available for retrieval.
    pub pairing_available: bool,
    /// Current lifecycle phase.
    pub phase: Phase,
}

/// Result of a pairing-code query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingStatus {
    /// The session is already connected; no pairing needed.
    Connected,
    /// A code is available, rendered for transport.
    QrReady {
        /// The opaque pairing code.
        code: String,
        /// Rendered image as a `data:` URL.
        image: String,
    },
    /// No code issued yet; the caller should retry shortly.
    Waiting,
}

/// State guarded by the manager's mutex: the session record, the waiter
/// registry, and the reconnect timer handle.
struct Inner {
    state: SessionState,
    waiters: WaiterRegistry,
    /// Pending debounced reconnect task; at most one outstanding.
    reconnect: Option<JoinHandle<()>>,
    /// Monotonic counter invalidating stale reconnect timers.
    reconnect_generation: u64,
}

impl Inner {
    /// Cancel any pending reconnect timer and invalidate in-flight fires.
    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
        self.reconnect_generation = self.reconnect_generation.wrapping_add(1);
    }
}

/// Owns the session lifecycle and serializes all access to it.
pub struct SessionManager {
    client: Arc<dyn ProtocolClient>,
    renderer: Arc<dyn PairingRenderer>,
    send_wait: Duration,
    reconnect_debounce: Duration,
    reconnect_on_auth_failure: bool,
    address_suffix: String,
    /// Self-handle for the reconnect timer tasks the manager spawns.
    weak: Weak<SessionManager>,
    inner: Mutex<Inner>,
}

impl SessionManager {
    /// Create a manager bound to its two collaborators.
    ///
    /// Returns an `Arc` because the manager hands clones of itself to the
    /// reconnect timers it spawns. It is the sole caller of the client's
    /// lifecycle operations for the process lifetime.
    #[must_use]
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        renderer: Arc<dyn PairingRenderer>,
        config: &GlobalConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            client,
            renderer,
            send_wait: config.send_wait(),
            reconnect_debounce: config.reconnect_debounce(),
            reconnect_on_auth_failure: config.reconnect.on_auth_failure,
            address_suffix: config.bridge.address_suffix.clone(),
            weak: weak.clone(),
            inner: Mutex::new(Inner {
                state: SessionState::new(),
                waiters: WaiterRegistry::default(),
                reconnect: None,
                reconnect_generation: 0,
            }),
        })
    }

    /// Kick off the first client initialization.
    ///
    /// A failed start is not fatal: the error is recorded and a debounced
    /// retry is scheduled, the same path a mid-life disconnect takes.
    pub async fn start(&self) {
        info!("initializing protocol client");
        if let Err(err) = self.client.initialize().await {
            warn!(%err, "initial client start failed, scheduling retry");
            let mut inner = self.inner.lock().await;
            inner.state.last_error = Some(err.to_string());
            if !inner.state.phase.is_closing() {
                inner.state.phase = Phase::Disconnected;
                self.schedule_reconnect_locked(&mut inner);
            }
        }
    }

    /// Pump client events into the state machine until `cancel` fires or
    /// the channel closes.
    pub async fn run_events(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ClientEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("event pump cancelled");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("event channel closed");
                        break;
                    };
                    self.handle_event(event).await;
                }
            }
        }
    }

    /// Apply one client event: transition the state machine and carry out
    /// the side effects it demands.
    pub async fn handle_event(&self, event: ClientEvent) {
        let mut inner = self.inner.lock().await;

        if inner.state.phase.is_closing() {
            debug!(?event, "event ignored during shutdown");
            return;
        }

        let from = inner.state.phase;
        let effects = inner.state.apply(&event, self.reconnect_on_auth_failure);
        log_event(&event);
        debug!(from = %from, to = %inner.state.phase, "phase transition");

        self.apply_effects(&mut inner, effects);
    }

    /// Pure read of the current state; non-blocking, always succeeds.
    pub async fn status(&self) -> StatusSnapshot {
        let inner = self.inner.lock().await;
        StatusSnapshot {
            ready: inner.state.phase == Phase::Ready,
            pairing_available: inner.state.pairing_code.is_some(),
            phase: inner.state.phase,
        }
    }

    /// Retrieve the current pairing code, rendered for transport.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Render`] if the renderer collaborator fails;
    /// the stored code remains valid for a retry.
    pub async fn pairing_code(&self) -> Result<PairingStatus> {
        let (phase, code) = {
            let inner = self.inner.lock().await;
            (inner.state.phase, inner.state.pairing_code.clone())
        };

        if phase == Phase::Ready {
            return Ok(PairingStatus::Connected);
        }

        match code {
            Some(code) => {
                let image = self.renderer.render(&code).map_err(|err| {
                    warn!(%err, "pairing code render failed");
                    err
                })?;
                Ok(PairingStatus::QrReady { code, image })
            }
            None => Ok(PairingStatus::Waiting),
        }
    }

    /// Deliver `body` to `target`, suspending until the session is ready.
    ///
    /// When the session is not ready the call registers as a waiter for the
    /// next readiness transition rather than polling, bounded by the
    /// configured wait. The waiter is deregistered on every exit path, so
    /// timed-out calls cannot accumulate in the registry.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotReady`] — the session is shutting down, or was not
    ///   ready on re-check after a wake.
    /// - [`AppError::Timeout`] — the bounded wait elapsed.
    /// - [`AppError::AuthFailed`] — authentication failed while waiting.
    /// - [`AppError::Send`] — the collaborator rejected the delivery.
    pub async fn send(&self, target: &str, body: &str) -> Result<serde_json::Value> {
        let waiter = {
            let mut inner = self.inner.lock().await;
            match inner.state.phase {
                Phase::Ready => None,
                phase if phase.is_closing() => return Err(AppError::NotReady { phase }),
                _ => Some(inner.waiters.register()),
            }
        };

        if let Some((id, rx)) = waiter {
            debug!("session not ready, suspending send");
            match tokio::time::timeout(self.send_wait, rx).await {
                Ok(Ok(WaitOutcome::Ready)) => {
                    // Re-check: a disconnect may have landed since the wake.
                    let inner = self.inner.lock().await;
                    if inner.state.phase != Phase::Ready {
                        return Err(AppError::NotReady {
                            phase: inner.state.phase,
                        });
                    }
                }
                Ok(Ok(WaitOutcome::AuthFailed)) => {
                    let inner = self.inner.lock().await;
                    let reason = inner
                        .state
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "authentication failure".to_owned());
                    return Err(AppError::AuthFailed(reason));
                }
                Ok(Err(_closed)) => {
                    // Registry drained (shutdown); fail fast.
                    let mut inner = self.inner.lock().await;
                    inner.waiters.remove(id);
                    return Err(AppError::NotReady {
                        phase: inner.state.phase,
                    });
                }
                Err(_elapsed) => {
                    let mut inner = self.inner.lock().await;
                    inner.waiters.remove(id);
                    return Err(AppError::Timeout {
                        phase: inner.state.phase,
                    });
                }
            }
        }

        let address = normalize_target(target, &self.address_suffix);
        match self.client.send(&address, body).await {
            Ok(receipt) => Ok(receipt),
            Err(err @ AppError::Send(_)) => Err(err),
            Err(err) => Err(AppError::Send(err.to_string())),
        }
    }

    /// Gracefully tear the session down. Idempotent: a second call while a
    /// shutdown is in progress (or complete) returns immediately.
    ///
    /// The known benign "already closed" transport failure from `destroy`
    /// is classified as success; any other destroy failure is logged and
    /// recorded, and the session still ends in `Destroyed`.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` mirrors the operation
    /// contract so callers can treat shutdown like the other operations.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state.phase.is_closing() {
                debug!("shutdown already in progress");
                return Ok(());
            }
            inner.state.phase = Phase::ShuttingDown;
            inner.state.pairing_code = None;
            inner.cancel_reconnect();
            let stranded = inner.waiters.drain();
            if stranded > 0 {
                info!(stranded, "dropped suspended senders for shutdown");
            }
        }

        info!("destroying protocol client");
        match self.client.destroy().await {
            Ok(()) => {}
            Err(err) if is_benign_close(&err) => {
                info!("client already closed");
            }
            Err(err) => {
                warn!(%err, "client destroy failed");
                let mut inner = self.inner.lock().await;
                inner.state.last_error = Some(err.to_string());
            }
        }

        let mut inner = self.inner.lock().await;
        inner.state.phase = Phase::Destroyed;
        info!("session destroyed");
        Ok(())
    }

    /// Number of currently suspended senders. Diagnostic only.
    pub async fn pending_waiters(&self) -> usize {
        self.inner.lock().await.waiters.len()
    }

    /// Carry out the side effects of a transition while holding the lock.
    fn apply_effects(&self, inner: &mut Inner, effects: Effects) {
        if effects.cancel_reconnect {
            inner.cancel_reconnect();
        }

        if let Some(wake) = effects.wake {
            let outcome = match wake {
                Wake::Ready => WaitOutcome::Ready,
                Wake::AuthFailed => WaitOutcome::AuthFailed,
            };
            let woken = inner.waiters.wake_all(outcome);
            if woken > 0 {
                debug!(woken, ?outcome, "woke suspended senders");
            }
        }

        if effects.schedule_reconnect {
            self.schedule_reconnect_locked(inner);
        }
    }

    /// Schedule a debounced reconnect, replacing any pending timer.
    ///
    /// Only ever called while `inner` is locked and the phase is
    /// `Disconnected`, preserving the timer-only-while-disconnected
    /// invariant.
    fn schedule_reconnect_locked(&self, inner: &mut Inner) {
        inner.cancel_reconnect();

        let Some(manager) = self.weak.upgrade() else {
            // Manager is being dropped; nothing left to reconnect.
            return;
        };
        let generation = inner.reconnect_generation;
        let debounce = self.reconnect_debounce;

        inner.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            manager.reconnect_fire(generation).await;
        }));
        debug!(generation, ?debounce, "reconnect scheduled");
    }

    /// Debounce timer callback: re-validate, then re-initialize.
    async fn reconnect_fire(&self, generation: u64) {
        {
            let mut inner = self.inner.lock().await;
            if inner.reconnect_generation != generation
                || inner.state.phase != Phase::Disconnected
            {
                debug!(generation, "stale reconnect timer fired, ignoring");
                return;
            }
            inner.reconnect = None;
            inner.state.phase = Phase::Initializing;
        }

        info!("reconnecting protocol client");
        if let Err(err) = self.client.initialize().await {
            warn!(%err, "reconnect attempt failed");
            let mut inner = self.inner.lock().await;
            inner.state.last_error = Some(err.to_string());
            // Fall back to Disconnected and try again after another window.
            if inner.state.phase == Phase::Initializing {
                inner.state.phase = Phase::Disconnected;
                self.schedule_reconnect_locked(&mut inner);
            }
        }
    }
}

/// Normalize a target into protocol addressing form: already-addressed
/// targets (containing `@`) pass through unchanged, bare ones get the
/// configured suffix appended.
fn normalize_target(target: &str, suffix: &str) -> String {
    if target.contains('@') {
        target.to_owned()
    } else {
        format!("{target}{suffix}")
    }
}

/// Whether a destroy failure is the known benign "already closed" race.
fn is_benign_close(err: &AppError) -> bool {
    matches!(err, AppError::Transport(msg) if msg.contains("closed"))
}

/// Log one client event the way operators expect to read it.
fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::PairingCode { .. } => info!("pairing code received"),
        ClientEvent::Authenticated => info!("session authenticated"),
        ClientEvent::Ready => info!("session ready"),
        ClientEvent::AuthFailure { reason } => warn!(%reason, "authentication failure"),
        ClientEvent::Disconnected { reason } => warn!(%reason, "session disconnected"),
        ClientEvent::Error { message } => warn!(%message, "client error"),
    }
}
