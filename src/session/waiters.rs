//! Registry of suspended `send` callers awaiting a readiness transition.
//!
//! Each waiter is a [`tokio::sync::oneshot`] sender keyed by a counter.
//! The `oneshot` channel gives exactly-once delivery for free: a sender is
//! consumed on use, and waking drains the map, so no waiter can be resolved
//! twice or dropped silently. Callers that stop waiting (timeout) remove
//! their own entry so the registry cannot grow without bound.

use std::collections::HashMap;

use tokio::sync::oneshot;

/// Outcome delivered to a suspended caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The session reached `Ready`.
    Ready,
    /// Authentication failed; waiting longer cannot help.
    AuthFailed,
}

/// Pending waiter senders keyed by registration id.
///
/// Must only be accessed under the same lock that guards the session state,
/// so registration is atomic with the phase check that preceded it.
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    next_id: u64,
    waiters: HashMap<u64, oneshot::Sender<WaitOutcome>>,
}

impl WaiterRegistry {
    /// Register a new waiter, returning its id and the receiving half.
    pub fn register(&mut self) -> (u64, oneshot::Receiver<WaitOutcome>) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        (id, rx)
    }

    /// Remove a waiter that stopped waiting (timed out or was dropped).
    ///
    /// Returns `true` if the waiter was still registered.
    pub fn remove(&mut self, id: u64) -> bool {
        self.waiters.remove(&id).is_some()
    }

    /// Resolve every registered waiter with `outcome`, draining the registry.
    ///
    /// Returns the number of waiters woken. Receivers that disappeared
    /// between registration and wake are skipped silently.
    pub fn wake_all(&mut self, outcome: WaitOutcome) -> usize {
        let woken = self.waiters.len();
        for (_, tx) in self.waiters.drain() {
            let _ = tx.send(outcome);
        }
        woken
    }

    /// Drop every registered sender without an outcome.
    ///
    /// Used during shutdown: the corresponding receivers observe a closed
    /// channel and fail fast instead of running out their full timeout.
    pub fn drain(&mut self) -> usize {
        let dropped = self.waiters.len();
        self.waiters.clear();
        dropped
    }

    /// Number of currently registered waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
