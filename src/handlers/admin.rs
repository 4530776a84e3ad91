//! Admin handlers: fine waivers and manual sweep triggers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::installment::{Installment, InstallmentService, WaiveFineRequest};
use crate::middleware::CallerIdentity;
use crate::models::ApiResponse;
use crate::scanner::SweepService;

/// Acknowledgement returned when a sweep is kicked off manually
#[derive(Debug, Serialize)]
pub struct SweepTriggered {
    pub sweep: &'static str,
    pub status: &'static str,
}

pub async fn waive_fine(
    State(service): State<Arc<InstallmentService>>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<WaiveFineRequest>,
) -> Result<Json<ApiResponse<Installment>>, ApiError> {
    caller.require_admin()?;
    request.validate().map_err(ApiError::BadRequest)?;

    let change = service.waive_fine(&id, &request.reason).await?;

    tracing::info!(
        installment_id = %id,
        admin_id = %caller.user_id,
        previous = ?change.previous.status,
        current = ?change.current.status,
        "Fine waived"
    );

    Ok(Json(ApiResponse::ok(change.current)))
}

/// Kick off the reminder sweep outside its schedule. The sweep runs in
/// the background; the response only acknowledges the trigger.
pub async fn trigger_reminder_sweep(
    State(sweeps): State<Arc<SweepService>>,
    caller: CallerIdentity,
) -> Result<Json<ApiResponse<SweepTriggered>>, ApiError> {
    caller.require_admin()?;

    tokio::spawn(async move {
        match sweeps.run_reminder_sweep().await {
            Ok(report) => {
                tracing::info!(
                    scanned = report.scanned,
                    processed = report.processed,
                    failed = report.failed,
                    "Manually triggered reminder sweep finished"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Manually triggered reminder sweep failed");
            }
        }
    });

    Ok(Json(ApiResponse::ok(SweepTriggered {
        sweep: "reminder",
        status: "started",
    })))
}

pub async fn trigger_overdue_sweep(
    State(sweeps): State<Arc<SweepService>>,
    caller: CallerIdentity,
) -> Result<Json<ApiResponse<SweepTriggered>>, ApiError> {
    caller.require_admin()?;

    tokio::spawn(async move {
        match sweeps.run_overdue_sweep().await {
            Ok(report) => {
                tracing::info!(
                    scanned = report.scanned,
                    processed = report.processed,
                    failed = report.failed,
                    "Manually triggered overdue sweep finished"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Manually triggered overdue sweep failed");
            }
        }
    });

    Ok(Json(ApiResponse::ok(SweepTriggered {
        sweep: "overdue",
        status: "started",
    })))
}
