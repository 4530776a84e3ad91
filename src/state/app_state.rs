//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::installment::InstallmentService;
use crate::loan::LoanService;
use crate::payment::{PaymentService, WebhookReconciler};
use crate::scanner::SweepService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub installment_service: Arc<InstallmentService>,
    pub payment_service: Arc<PaymentService>,
    pub reconciler: Arc<WebhookReconciler>,
    pub sweep_service: Arc<SweepService>,
}

impl AppState {
    pub fn new(
        loan_service: Arc<LoanService>,
        installment_service: Arc<InstallmentService>,
        payment_service: Arc<PaymentService>,
        reconciler: Arc<WebhookReconciler>,
        sweep_service: Arc<SweepService>,
    ) -> Self {
        Self {
            loan_service,
            installment_service,
            payment_service,
            reconciler,
            sweep_service,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<InstallmentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.installment_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for Arc<WebhookReconciler> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reconciler.clone()
    }
}

impl FromRef<AppState> for Arc<SweepService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.sweep_service.clone()
    }
}
