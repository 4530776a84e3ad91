//! Payment route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/installments/:id/checkout-session",
            post(create_session),
        )
        .route("/api/payments/sessions/:session_id", get(verify_session))
        .route("/api/payments/webhook", post(gateway_webhook))
}
