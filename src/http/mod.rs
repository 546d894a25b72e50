//! HTTP gateway over the session manager's public operations.
//!
//! Routes: `GET /` (banner), `GET /health`, `GET /status`, `GET /qr`,
//! `POST /send`. The gateway is a thin caller of
//! [`SessionManager`](crate::session::SessionManager) — request validation
//! and JSON mapping live here, all session semantics live in the manager.

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::session::SessionManager;
use crate::{AppError, Result};

/// Build the gateway router bound to a session manager.
#[must_use]
pub fn router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health))
        .route("/status", get(api::status))
        .route("/qr", get(api::qr))
        .route("/send", post(api::send))
        .with_state(manager)
}

/// Serve the gateway on `127.0.0.1:port` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind, and
/// `AppError::Transport` if serving fails afterwards.
pub async fn serve(manager: Arc<SessionManager>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    info!(%bind, "starting HTTP gateway");

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Transport(format!("HTTP server error: {err}")))?;

    info!("HTTP gateway shut down");
    Ok(())
}
