use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::json_body;
use crate::auth::require_auth;
use crate::errors::AppResult;
use crate::services::payment_intent::{self, CreateIntentRequest, IntentResponse};
use crate::state::AppState;

// POST /payments/create-intent
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> AppResult<Json<IntentResponse>> {
    let session = require_auth(&state, &headers)?;
    let request = json_body(payload)?;
    let response = payment_intent::create_payment_intent(&state, &session.club_id, request).await?;
    Ok(Json(response))
}
