//! Loan lifecycle handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::installment::{Installment, InstallmentService};
use crate::loan::{
    CreateLoanRequest, CreateLoanResponse, ListLoansQuery, Loan, LoanDetail, LoanService,
};
use crate::middleware::CallerIdentity;
use crate::models::ApiResponse;

pub async fn create_loan(
    State(service): State<Arc<LoanService>>,
    caller: CallerIdentity,
    Json(request): Json<CreateLoanRequest>,
) -> Result<Json<ApiResponse<CreateLoanResponse>>, ApiError> {
    caller.require_admin()?;

    let response = service.create_loan(request, caller.user_id).await?;

    Ok(Json(ApiResponse::ok(response)))
}

pub async fn get_loan(
    State(loan_service): State<Arc<LoanService>>,
    State(installment_service): State<Arc<InstallmentService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanDetail>>, ApiError> {
    let loan = loan_service.get_loan(&id).await?;
    let installments = installment_service.list_for_loan(&id).await?;

    Ok(Json(ApiResponse::ok(LoanDetail { loan, installments })))
}

pub async fn list_loans(
    State(service): State<Arc<LoanService>>,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<ApiResponse<Vec<Loan>>>, ApiError> {
    let loans = service.list_loans(query).await?;

    Ok(Json(ApiResponse::ok(loans)))
}

pub async fn list_installments(
    State(loan_service): State<Arc<LoanService>>,
    State(installment_service): State<Arc<InstallmentService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Installment>>>, ApiError> {
    // 404 on unknown loan rather than an empty list
    loan_service.get_loan(&id).await?;
    let installments = installment_service.list_for_loan(&id).await?;

    Ok(Json(ApiResponse::ok(installments)))
}

pub async fn get_installment(
    State(service): State<Arc<InstallmentService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Installment>>, ApiError> {
    let installment = service.get_installment(&id).await?;

    Ok(Json(ApiResponse::ok(installment)))
}

pub async fn mark_completed(
    State(service): State<Arc<LoanService>>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    caller.require_admin()?;

    let loan = service.mark_completed(&id).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn mark_defaulted(
    State(service): State<Arc<LoanService>>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    caller.require_admin()?;

    let loan = service.mark_defaulted(&id).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn mark_cancelled(
    State(service): State<Arc<LoanService>>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    caller.require_admin()?;

    let loan = service.mark_cancelled(&id).await?;

    Ok(Json(ApiResponse::ok(loan)))
}
