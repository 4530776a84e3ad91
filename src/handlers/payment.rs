//! Checkout session and webhook handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::CallerIdentity;
use crate::models::ApiResponse;
use crate::payment::{
    CreateSessionRequest, CreateSessionResponse, PaymentService, SessionVerification,
    WebhookReconciler,
};

pub async fn create_session(
    State(service): State<Arc<PaymentService>>,
    caller: CallerIdentity,
    Path(installment_id): Path<Uuid>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<ApiResponse<CreateSessionResponse>>, ApiError> {
    let response = service
        .create_session(&installment_id, caller.user_id, request)
        .await?;

    Ok(Json(ApiResponse::ok(response)))
}

pub async fn verify_session(
    State(service): State<Arc<PaymentService>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionVerification>>, ApiError> {
    let verification = service.verify_session(&session_id).await?;

    Ok(Json(ApiResponse::ok(verification)))
}

/// Inbound gateway webhook.
///
/// Takes the raw body rather than a typed JSON extractor because the
/// signature covers the exact bytes as sent.
pub async fn gateway_webhook(
    State(reconciler): State<Arc<WebhookReconciler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let signature = headers
        .get("gateway-signature")
        .and_then(|h| h.to_str().ok());

    reconciler.handle_webhook(&body, signature).await?;

    Ok(Json(ApiResponse::ok(())))
}
