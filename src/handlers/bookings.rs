use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::json_body;
use crate::auth::{require_auth, resolve_session};
use crate::errors::{AppError, AppResult};
use crate::services::availability::get_availability;
use crate::services::booking::{self, CheckInRequest, CreateBookingRequest, CreatedBooking};
use crate::services::{notifications, players};
use crate::state::AppState;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

// GET /bookings/availability
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub date: Option<String>,
    pub court_id: Option<String>,
    pub duration: Option<u32>,
}

pub async fn availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let conn = state.db()?;
    let session = resolve_session(&conn, &headers, &state)?;

    let Query(query) =
        query.map_err(|_| AppError::Validation("Parámetros de consulta inválidos".into()))?;
    let date = booking::parse_date(
        query
            .date
            .as_deref()
            .ok_or_else(|| AppError::Validation("La fecha es requerida".into()))?,
    )?;
    let court_id = query
        .court_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("La cancha es requerida".into()))?;

    let availability = get_availability(
        &conn,
        &session.club_id,
        &court_id,
        date,
        query.duration,
        state.clock.now(),
        &state.config.default_timezone,
    )?;

    Ok(Json(json!({
        "success": true,
        "date": date,
        "courtId": court_id,
        "operatingHours": availability.hours.map(|h| h.to_human_readable()),
        "slots": availability.slots,
        "summary": availability.summary,
    })))
}

// POST /bookings
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let session = require_auth(&state, &headers)?;
    let request = json_body(payload)?.validate()?;

    let created = {
        let mut conn = state.db()?;
        booking::create_booking(
            &mut conn,
            &session.club_id,
            request,
            state.clock.now(),
            &state.config.default_timezone,
        )?
    };

    dispatch_side_effects(&state, &created);

    let body = serde_json::to_value(Envelope {
        success: true,
        data: created,
    })
    .map_err(anyhow::Error::from)?;
    Ok(Json(body))
}

/// Player stats and the WhatsApp confirmation. Neither can fail the request.
fn dispatch_side_effects(state: &AppState, created: &CreatedBooking) {
    let booking = &created.booking;
    let total = created
        .booking_group
        .as_ref()
        .map_or(booking.price, |g| g.total_price);

    if let Some(player_id) = &booking.player_id {
        players::record_booking_stats(
            Arc::clone(&state.db),
            player_id.clone(),
            total,
            state.now_utc(),
        );
    }

    if state.config.messaging_enabled() {
        let body = notifications::booking_created_message(
            booking,
            &created.club_name,
            &created.court_names.join(", "),
            total,
            created.payment_link.as_deref(),
        );
        notifications::notify_booking_created(
            Arc::clone(&state.messaging),
            booking.player_phone.clone(),
            body,
        );
    }
}

// GET /bookings/:id
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db()?;
    let session = resolve_session(&conn, &headers, &state)?;
    let booking = booking::get_booking(&conn, &session.club_id, &id)?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

// POST /bookings/:id/check-in
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let session = resolve_session(&conn, &headers, &state)?;

    let request: CheckInRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckInRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| AppError::Validation("Datos de la solicitud inválidos".into()))?
    };

    let booking = booking::check_in(
        &mut conn,
        &session.club_id,
        &session.user_id,
        &id,
        request,
        state.now_utc(),
    )?;
    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Check-in realizado exitosamente",
    })))
}

// DELETE /bookings/:id/check-in
pub async fn undo_check_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db()?;
    let session = resolve_session(&conn, &headers, &state)?;
    let booking = booking::undo_check_in(&conn, &session.club_id, &id, state.now_utc())?;
    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Check-in revertido",
    })))
}

// POST /bookings/:id/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db()?;
    let session = resolve_session(&conn, &headers, &state)?;
    let booking = booking::cancel_booking(&conn, &session.club_id, &id, state.now_utc())?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}
