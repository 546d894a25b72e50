//! Protocol client abstraction and the bridge-process implementation.
//!
//! The [`ProtocolClient`] trait decouples the session manager from the
//! messaging transport: implementations emit [`ClientEvent`]s into a shared
//! channel and accept `initialize` / `send` / `destroy` calls. The
//! production implementation, [`bridge::BridgeClient`], drives a vendor
//! bridge process over newline-delimited JSON on its stdio.

pub mod bridge;
pub mod codec;
pub mod reader;
pub mod writer;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// Lifecycle events emitted by a protocol client into the shared channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The service issued a pairing code for the operator to scan.
    PairingCode {
        /// Opaque one-time code.
        code: String,
    },
    /// The pairing was accepted; credentials are being established.
    Authenticated,
    /// The session can now send and receive messages.
    Ready,
    /// Authentication failed; re-pairing is required.
    AuthFailure {
        /// Failure reason reported by the service.
        reason: String,
    },
    /// The transport dropped.
    Disconnected {
        /// Disconnect reason reported by the service or transport.
        reason: String,
    },
    /// A non-fatal client-level error; diagnostic only.
    Error {
        /// Error message reported by the client.
        message: String,
    },
}

/// Interface between the session manager and the messaging transport.
///
/// The session manager is the sole caller of these lifecycle operations;
/// no other component may invoke them directly.
pub trait ProtocolClient: Send + Sync {
    /// Start (or restart) the underlying session.
    ///
    /// Called once at process start and again on each debounced reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) if the
    /// bridge process cannot be launched or written to.
    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Deliver `body` to `target` (already in protocol addressing form).
    ///
    /// Resolves with the collaborator's acknowledgement payload.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Send`](crate::AppError::Send) if the service
    /// rejects the message or does not acknowledge it in time, and
    /// [`AppError::Transport`](crate::AppError::Transport) if the bridge
    /// stream is gone.
    fn send<'a>(
        &'a self,
        target: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Tear the session down for good.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) when the
    /// transport is already closed — callers performing shutdown classify
    /// that specific failure as success.
    fn destroy(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
