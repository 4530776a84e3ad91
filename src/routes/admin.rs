//! Admin route definitions

use axum::{routing::post, Router};

use crate::handlers::*;
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/installments/:id/waive-fine", post(waive_fine))
        .route(
            "/api/admin/sweeps/reminders",
            post(trigger_reminder_sweep),
        )
        .route("/api/admin/sweeps/overdue", post(trigger_overdue_sweep))
}
