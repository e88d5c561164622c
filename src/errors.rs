use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("No autorizado")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Configuration(String),

    /// Check-in refused until the outstanding balance is collected.
    #[error("{0}")]
    PaymentRequired(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Configuration(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentRequired(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                serde_json::json!({ "success": false, "error": "Error interno del servidor" })
            }
            AppError::Gateway(_) => {
                tracing::error!(error = %self, "payment gateway call failed");
                serde_json::json!({ "success": false, "error": "Error al procesar el pago" })
            }
            AppError::PaymentRequired(msg) => {
                serde_json::json!({ "success": false, "error": msg, "needsPayment": true })
            }
            _ => serde_json::json!({ "success": false, "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_payment_required_carries_flag() {
        let (status, json) = body_json(AppError::PaymentRequired("Pago requerido".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["needsPayment"], true);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let (status, json) =
            body_json(AppError::Internal(anyhow::anyhow!("disk on fire"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Error interno del servidor");
    }

    #[tokio::test]
    async fn test_conflict_keeps_message() {
        let (status, json) = body_json(AppError::Conflict("horario ocupado".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "horario ocupado");
    }
}
