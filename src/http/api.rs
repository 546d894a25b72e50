//! Request handlers and JSON payloads for the gateway routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::session::{PairingStatus, SessionManager};

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether messages can be sent right now.
    pub ready: bool,
    /// Whether a pairing code is available for retrieval.
    pub pairing_available: bool,
    /// Current lifecycle phase.
    pub phase: String,
}

/// Response payload for `GET /qr`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairingResponse {
    /// The session is already connected.
    Connected,
    /// A pairing code is ready to scan.
    QrReady {
        /// The opaque pairing code.
        qr_code: String,
        /// Rendered image as a `data:` URL.
        qr_image: String,
    },
    /// No code issued yet.
    Waiting,
    /// Code retrieval or rendering failed.
    Error {
        /// Failure description.
        message: String,
    },
}

/// Request body for `POST /send`.
///
/// Fields are optional so absence maps to a `400` with a stable error body
/// instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Target number or protocol address.
    pub number: Option<String>,
    /// Message body.
    pub message: Option<String>,
}

/// Success payload for `POST /send`.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// Always `true` on the success path.
    pub success: bool,
    /// Collaborator acknowledgement, passed through verbatim.
    pub response: serde_json::Value,
}

/// Error payload shared by the failure paths.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Failure description.
    pub error: String,
}

/// Handler for `GET /` — plain-text banner.
pub async fn root() -> &'static str {
    "courier-gateway running"
}

/// Handler for `GET /health` — liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Handler for `GET /status`.
pub async fn status(State(manager): State<Arc<SessionManager>>) -> Json<StatusResponse> {
    let snapshot = manager.status().await;
    Json(StatusResponse {
        ready: snapshot.ready,
        pairing_available: snapshot.pairing_available,
        phase: snapshot.phase.as_str().to_owned(),
    })
}

/// Handler for `GET /qr`.
///
/// Render failures are reported in-band as `{status: "error"}` with `200`,
/// matching the other pairing outcomes: the code is still valid and the
/// caller is expected to retry.
pub async fn qr(State(manager): State<Arc<SessionManager>>) -> Json<PairingResponse> {
    match manager.pairing_code().await {
        Ok(PairingStatus::Connected) => Json(PairingResponse::Connected),
        Ok(PairingStatus::QrReady { code, image }) => Json(PairingResponse::QrReady {
            qr_code: code,
            qr_image: image,
        }),
        Ok(PairingStatus::Waiting) => Json(PairingResponse::Waiting),
        Err(err) => Json(PairingResponse::Error {
            message: err.to_string(),
        }),
    }
}

/// Handler for `POST /send`.
///
/// # Errors
///
/// - `400` when `number` or `message` is absent or empty.
/// - `500` with the manager's error message on any session failure.
pub async fn send(
    State(manager): State<Arc<SessionManager>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, (StatusCode, Json<ErrorResponse>)> {
    let number = request.number.filter(|n| !n.is_empty());
    let message = request.message.filter(|m| !m.is_empty());

    let (Some(number), Some(message)) = (number, message) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "number and message are required".to_owned(),
            }),
        ));
    };

    match manager.send(&number, &message).await {
        Ok(response) => Ok(Json(SendResponse {
            success: true,
            response,
        })),
        Err(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )),
    }
}
