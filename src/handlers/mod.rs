pub mod bookings;
pub mod health;
pub mod payments;
pub mod webhook;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::errors::AppError;

/// Malformed JSON bodies surface as validation errors in the usual envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        AppError::Validation("Datos de la solicitud inválidos".into())
    })
}
