use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookcast_core::WebhookError;
use serde::Serialize;

use crate::server::AppState;

/// Plain-text response for a webhook that ended without a broadcast.
pub fn webhook_error_response(err: &WebhookError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.body()).into_response()
}

/// `/webhook`: filter, normalize, and fan out one notification.
///
/// Subscriber delivery failures never change the response; once the payload
/// is accepted the caller always gets `ok`.
///
/// The body is extracted before the method is looked at, so an unreadable
/// body answers 400 even on a non-POST request. The method check itself
/// lives in `normalize_request`.
pub async fn webhook_handler(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    tracing::info!(%method, "webhook received");

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read webhook body");
            return (StatusCode::BAD_REQUEST, "cannot read body").into_response();
        }
    };

    let payload = match hookcast_core::normalize_request(method.as_str(), &body) {
        Ok(payload) => payload,
        Err(err) => return webhook_error_response(&err),
    };

    state.registry.broadcast(payload.as_str()).await;
    (StatusCode::OK, "ok").into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub subscribers: usize,
}

/// `/health`: liveness plus the current subscriber count.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        subscribers: state.registry.count().await,
    })
}
