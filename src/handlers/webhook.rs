use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::db::queries;
use crate::services::gateway::signature::verify_signature;
use crate::services::gateway::{GatewayCredentials, STRIPE_PROVIDER_ID};
use crate::services::webhook::{apply_event, WebhookEvent};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn reply(status: StatusCode, error: &str) -> Response {
    (status, Json(serde_json::json!({ "error": error }))).into_response()
}

fn received() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "received": true }))).into_response()
}

// POST /webhooks/payment-gateway
//
// Only transport and verification problems produce a non-200. Once an event
// is verified it is always acknowledged, even if applying it failed.
pub async fn payment_gateway(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        tracing::warn!("webhook without signature header");
        return reply(StatusCode::BAD_REQUEST, "Missing signature");
    };

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "webhook body is not a valid event");
            return reply(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let Some(club_id) = event.club_id().map(str::to_string) else {
        tracing::warn!(event_id = %event.id, "webhook event without club metadata");
        return reply(StatusCode::BAD_REQUEST, "Invalid club context");
    };

    let mut conn = match state.db() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "webhook could not reach the database");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, "Webhook handler failed");
        }
    };

    let provider = match queries::get_payment_provider(&conn, &club_id, STRIPE_PROVIDER_ID) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!(club_id = %club_id, error = %e, "failed to load payment provider");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, "Webhook handler failed");
        }
    };
    let secret = provider
        .as_ref()
        .and_then(GatewayCredentials::from_provider)
        .and_then(|creds| creds.webhook_secret().map(str::to_string));
    let Some(secret) = secret else {
        tracing::warn!(club_id = %club_id, "no webhook secret configured");
        return reply(StatusCode::BAD_REQUEST, "Webhook verification failed");
    };

    if let Err(e) = verify_signature(
        &body,
        signature,
        &secret,
        state.clock.now().timestamp(),
        state.config.webhook_tolerance_secs,
    ) {
        tracing::warn!(club_id = %club_id, error = %e, "webhook signature rejected");
        return reply(StatusCode::BAD_REQUEST, "Webhook verification failed");
    }

    match apply_event(&mut conn, &club_id, &event, state.now_utc()) {
        Ok(outcome) => tracing::info!(
            event_id = %event.id,
            event_type = %event.kind,
            outcome = ?outcome,
            "webhook processed"
        ),
        Err(e) => tracing::error!(
            event_id = %event.id,
            event_type = %event.kind,
            error = %e,
            "webhook processing failed"
        ),
    }

    received()
}
