//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(create_loan))
        .route("/api/loans", get(list_loans))
        .route("/api/loans/:id", get(get_loan))
        .route("/api/loans/:id/installments", get(list_installments))
        .route("/api/loans/:id/complete", post(mark_completed))
        .route("/api/loans/:id/default", post(mark_defaulted))
        .route("/api/loans/:id/cancel", post(mark_cancelled))
        .route("/api/installments/:id", get(get_installment))
}
