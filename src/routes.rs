use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/bookings/availability",
            get(handlers::bookings::availability),
        )
        .route("/bookings", post(handlers::bookings::create))
        .route("/bookings/:id", get(handlers::bookings::get_one))
        .route(
            "/bookings/:id/check-in",
            post(handlers::bookings::check_in).delete(handlers::bookings::undo_check_in),
        )
        .route("/bookings/:id/cancel", post(handlers::bookings::cancel))
        .route(
            "/payments/create-intent",
            post(handlers::payments::create_intent),
        )
        .route(
            "/webhooks/payment-gateway",
            post(handlers::webhook::payment_gateway),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
