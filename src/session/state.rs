//! Session lifecycle state machine.
//!
//! [`SessionState`] is the single mutable record describing the bridge
//! connection. All transitions go through [`SessionState::apply`], a pure
//! dispatch on `(current phase, incoming event)` that returns the side
//! effects the owning [`SessionManager`](crate::session::SessionManager)
//! must carry out. Ad hoc readiness flags are deliberately absent: `ready`
//! and `pairing_available` are derived from the single `phase` field on
//! read.
//!
//! # Invariants
//!
//! - `pairing_code` is `Some` iff `phase == PairingRequired`.
//! - No transition is accepted once the phase is `ShuttingDown` or
//!   `Destroyed`.
//! - Entering `Ready` always clears the pairing code.

use std::fmt::{Display, Formatter};

use crate::client::ClientEvent;

/// Lifecycle phase of the bridge session. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The protocol client is starting up; no pairing code issued yet.
    Initializing,
    /// A pairing code has been issued and awaits the operator.
    PairingRequired,
    /// The service accepted the pairing; the session is authenticating.
    Authenticating,
    /// The session can send and receive messages.
    Ready,
    /// Authentication failed; operator re-pairing is required.
    AuthFailed,
    /// The transport dropped; a debounced reconnect may be pending.
    Disconnected,
    /// Administrative shutdown in progress.
    ShuttingDown,
    /// Terminal phase after graceful shutdown completes.
    Destroyed,
}

impl Phase {
    /// Stable snake_case name, used in JSON responses and diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::PairingRequired => "pairing_required",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::AuthFailed => "auth_failed",
            Self::Disconnected => "disconnected",
            Self::ShuttingDown => "shutting_down",
            Self::Destroyed => "destroyed",
        }
    }

    /// Whether the phase accepts no further client events.
    #[must_use]
    pub fn is_closing(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Destroyed)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which waiter outcome a transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The session became ready; suspended senders may proceed.
    Ready,
    /// Authentication failed; suspended senders fail fast.
    AuthFailed,
}

/// Side effects the session manager must perform after a transition.
///
/// Kept as data rather than callbacks so the dispatch itself stays pure
/// and directly testable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Effects {
    /// Wake all registered waiters with this outcome.
    pub wake: Option<Wake>,
    /// Schedule a debounced reconnect attempt.
    pub schedule_reconnect: bool,
    /// Cancel any pending reconnect timer.
    pub cancel_reconnect: bool,
}

/// The single mutable session record, exclusively owned by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Opaque pairing code; present only in `PairingRequired`.
    pub pairing_code: Option<String>,
    /// Last observed failure reason. Diagnostic only, never authoritative
    /// for the phase.
    pub last_error: Option<String>,
}

impl SessionState {
    /// A fresh session at process start.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Initializing,
            pairing_code: None,
            last_error: None,
        }
    }

    /// Apply one client event, mutating the record and returning the side
    /// effects the manager must carry out.
    ///
    /// Events arriving in `ShuttingDown` or `Destroyed` are ignored and
    /// produce no effects. `reconnect_on_auth_failure` controls whether a
    /// disconnect observed while in `AuthFailed` re-enters the reconnect
    /// cycle or stays put for operator intervention.
    pub fn apply(&mut self, event: &ClientEvent, reconnect_on_auth_failure: bool) -> Effects {
        if self.phase.is_closing() {
            return Effects::default();
        }

        match event {
            ClientEvent::PairingCode { code } => {
                // A fresh code both enters PairingRequired and replaces any
                // previous code issued during the same cycle.
                self.phase = Phase::PairingRequired;
                self.pairing_code = Some(code.clone());
                Effects::default()
            }
            ClientEvent::Authenticated => {
                self.phase = Phase::Authenticating;
                self.pairing_code = None;
                Effects::default()
            }
            ClientEvent::Ready => {
                self.phase = Phase::Ready;
                self.pairing_code = None;
                Effects {
                    wake: Some(Wake::Ready),
                    cancel_reconnect: true,
                    schedule_reconnect: false,
                }
            }
            ClientEvent::AuthFailure { reason } => {
                self.phase = Phase::AuthFailed;
                self.pairing_code = None;
                self.last_error = Some(reason.clone());
                Effects {
                    wake: Some(Wake::AuthFailed),
                    ..Effects::default()
                }
            }
            ClientEvent::Disconnected { reason } => {
                if self.phase == Phase::AuthFailed && !reconnect_on_auth_failure {
                    // Stay in AuthFailed so the operator sees the real cause;
                    // re-pairing is required before another cycle starts.
                    self.last_error = Some(reason.clone());
                    return Effects::default();
                }
                self.phase = Phase::Disconnected;
                self.pairing_code = None;
                self.last_error = Some(reason.clone());
                Effects {
                    schedule_reconnect: true,
                    ..Effects::default()
                }
            }
            ClientEvent::Error { message } => {
                self.last_error = Some(message.clone());
                Effects::default()
            }
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
