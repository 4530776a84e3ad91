//! HTTP handlers for the lending API

mod admin;
mod loan;
mod payment;

pub use admin::*;
pub use loan::*;
pub use payment::*;

use axum::Json;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "lendcore-server",
    })
}
