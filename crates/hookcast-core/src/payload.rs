//! Webhook payload filtering and `from` normalization.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::{IgnoreReason, WebhookError};
use crate::identifier;

/// A payload that passed every filter, serialized and ready to broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedPayload {
    from: String,
    body: String,
}

impl NormalizedPayload {
    /// The canonical sender identifier written into the payload.
    pub fn sender(&self) -> &str {
        &self.from
    }

    /// Serialized JSON text sent to subscribers.
    pub fn as_str(&self) -> &str {
        &self.body
    }
}

fn ignore(reason: IgnoreReason) -> IgnoreReason {
    warn!(reason = reason.as_str(), "webhook ignored");
    reason
}

/// Validate a decoded payload and rewrite its `from` field into canonical form.
///
/// All other fields are returned untouched.
pub fn normalize_payload(mut payload: Map<String, Value>) -> Result<Map<String, Value>, IgnoreReason> {
    let Some(message) = payload.get("message").and_then(Value::as_object) else {
        return Err(ignore(IgnoreReason::NoMessageObject));
    };

    match message.get("text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => {}
        _ => return Err(ignore(IgnoreReason::EmptyMessageText)),
    }

    let from = match payload.get("from").and_then(Value::as_str) {
        Some(from) if !from.is_empty() => from,
        _ => return Err(ignore(IgnoreReason::NoValidFrom)),
    };

    if identifier::is_group(from) {
        warn!(from, "sender is a group chat");
        return Err(ignore(IgnoreReason::GroupDetected));
    }

    let Some(canonical) = identifier::canonicalize(from) else {
        warn!(from, "no personal identifier in sender");
        return Err(ignore(IgnoreReason::InvalidFormat));
    };

    debug!(raw = from, from = %canonical, "normalized sender");
    payload.insert("from".into(), Value::String(canonical));
    Ok(payload)
}

/// Run a raw webhook request through method, JSON, and payload checks.
pub fn normalize_request(method: &str, body: &[u8]) -> Result<NormalizedPayload, WebhookError> {
    if method != "POST" {
        warn!(method, "webhook rejected: method not allowed");
        return Err(WebhookError::MethodNotAllowed);
    }

    debug!(body = %String::from_utf8_lossy(body), "webhook body");

    // A bare `null` decodes to an empty object rather than a parse error.
    let payload: Option<Map<String, Value>> = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "webhook rejected: invalid JSON");
        WebhookError::InvalidJson(e)
    })?;

    let payload = normalize_payload(payload.unwrap_or_default())?;
    let from = payload
        .get("from")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let body = serde_json::to_string(&payload).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize filtered body");
        WebhookError::Serialize(e)
    })?;

    info!(from = %from, bytes = body.len(), "webhook accepted");
    Ok(NormalizedPayload { from, body })
}
