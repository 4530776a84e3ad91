//! Payment session broker - creates gateway checkout sessions for
//! installments and owns the payment transaction audit trail.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::installment::{Installment, InstallmentService, InstallmentStatus};
use crate::payment::gateway::{CreateCheckoutParams, PaymentGateway};
use crate::payment::{
    CreateSessionRequest, CreateSessionResponse, PaymentTransaction, SessionDetails,
    SessionMetadata, TransactionStatus,
};

/// Checkout sessions expire on the gateway after this window
const SESSION_EXPIRY_MINUTES: i64 = 60;

/// Gateway view of a session next to the local audit record
#[derive(Debug, Serialize)]
pub struct SessionVerification {
    pub session: SessionDetails,
    pub transaction: Option<PaymentTransaction>,
}

/// Payment service for checkout sessions and transaction records
#[derive(Clone)]
pub struct PaymentService {
    db_pool: PgPool,
    installment_service: InstallmentService,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl PaymentService {
    /// Create a new payment service instance
    pub fn new(
        db_pool: PgPool,
        installment_service: InstallmentService,
        gateway: Arc<dyn PaymentGateway>,
        currency: String,
    ) -> Self {
        Self {
            db_pool,
            installment_service,
            gateway,
            currency,
        }
    }

    /// Create a hosted checkout session for an installment.
    ///
    /// The charge amount captures the total due (EMI plus any fine accrued
    /// so far) at session-creation time; a fine accruing afterwards is not
    /// retroactively added to the session. Any prior session id on the
    /// installment is overwritten - only the most recent session is live.
    /// Gateway errors surface verbatim; retries are the caller's to make
    /// by re-invoking session creation.
    pub async fn create_session(
        &self,
        installment_id: &Uuid,
        requesting_user_id: Uuid,
        request: CreateSessionRequest,
    ) -> ApiResult<CreateSessionResponse> {
        let installment = self.installment_service.get_installment(installment_id).await?;

        if installment.borrower_id != requesting_user_id {
            return Err(ApiError::Forbidden(
                "Installment does not belong to the requesting user".to_string(),
            ));
        }

        match installment.status {
            InstallmentStatus::Paid => {
                return Err(ApiError::InvalidTransition(format!(
                    "Installment {} is already paid",
                    installment_id
                )));
            }
            InstallmentStatus::Waived => {
                return Err(ApiError::InvalidTransition(format!(
                    "Installment {} is waived and not payable",
                    installment_id
                )));
            }
            _ => {}
        }

        let session = self
            .request_gateway_session(&installment, &request.success_url, &request.cancel_url)
            .await?;

        self.installment_service
            .attach_session(installment_id, &session.id)
            .await?;

        self.insert_pending_transaction(&installment, &session.id, session.payment_intent_id.as_deref())
            .await?;

        tracing::info!(
            installment_id = %installment_id,
            session_id = %session.id,
            amount = session.amount,
            "Checkout session created"
        );

        Ok(CreateSessionResponse {
            session_id: session.id,
            url: session.url,
            amount: session.amount,
            currency: session.currency,
            expires_at: session.expires_at,
        })
    }

    /// Create a gateway session for an installment without the ownership
    /// check. Used by the sweep path, which acts on the borrower's behalf.
    pub async fn create_session_for_sweep(
        &self,
        installment: &Installment,
        success_url: &str,
        cancel_url: &str,
    ) -> ApiResult<String> {
        let session = self
            .request_gateway_session(installment, success_url, cancel_url)
            .await?;

        self.installment_service
            .attach_session(&installment.id, &session.id)
            .await?;

        self.insert_pending_transaction(installment, &session.id, session.payment_intent_id.as_deref())
            .await?;

        Ok(session.url)
    }

    async fn request_gateway_session(
        &self,
        installment: &Installment,
        success_url: &str,
        cancel_url: &str,
    ) -> ApiResult<crate::payment::CheckoutSession> {
        let params = CreateCheckoutParams {
            description: format!(
                "Loan installment #{} of loan {}",
                installment.installment_number, installment.loan_id
            ),
            amount: installment.total_due,
            currency: self.currency.clone(),
            metadata: SessionMetadata {
                installment_id: installment.id,
                loan_id: installment.loan_id,
                borrower_id: installment.borrower_id,
                installment_number: installment.installment_number,
            },
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            expires_at: Utc::now() + Duration::minutes(SESSION_EXPIRY_MINUTES),
        };

        self.gateway
            .create_checkout_session(params)
            .await
            .map_err(|e| ApiError::GatewayError(e.to_string()))
    }

    async fn insert_pending_transaction(
        &self,
        installment: &Installment,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> ApiResult<PaymentTransaction> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            INSERT INTO payment_transactions (
                id, installment_id, loan_id, borrower_id, amount, currency,
                status, gateway_session_id, gateway_payment_intent_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(installment.id)
        .bind(installment.loan_id)
        .bind(installment.borrower_id)
        .bind(installment.total_due)
        .bind(&self.currency)
        .bind(TransactionStatus::Pending)
        .bind(session_id)
        .bind(payment_intent_id)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(transaction)
    }

    /// Verify a session by id: the gateway's view plus the local audit record
    pub async fn verify_session(&self, session_id: &str) -> ApiResult<SessionVerification> {
        let session = self
            .gateway
            .retrieve_session(session_id)
            .await
            .map_err(|e| ApiError::GatewayError(e.to_string()))?;

        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE gateway_session_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(SessionVerification {
            session,
            transaction,
        })
    }

    /// Flip the PENDING transaction matched by session id to SUCCESS. Runs
    /// on the reconciliation transaction.
    pub async fn mark_transaction_success(
        &self,
        conn: &mut PgConnection,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> ApiResult<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            UPDATE payment_transactions
            SET status = 'success',
                gateway_payment_intent_id = COALESCE($2, gateway_payment_intent_id),
                updated_at = $3
            WHERE gateway_session_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(payment_intent_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(transaction)
    }

    /// Flip the PENDING transaction matched by payment-intent id to
    /// SUCCESS. Used for intent-level success events that carry no
    /// session id.
    pub async fn mark_transaction_success_by_intent(
        &self,
        conn: &mut PgConnection,
        payment_intent_id: &str,
    ) -> ApiResult<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            UPDATE payment_transactions
            SET status = 'success', updated_at = $2
            WHERE gateway_payment_intent_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(payment_intent_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(transaction)
    }

    /// Flip the transaction matched by payment-intent id to FAILED with the
    /// gateway-provided reason. The installment itself stays payable.
    pub async fn mark_transaction_failed(
        &self,
        payment_intent_id: &str,
        failure_reason: Option<&str>,
    ) -> ApiResult<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            UPDATE payment_transactions
            SET status = 'failed',
                failure_reason = $2,
                updated_at = $3
            WHERE gateway_payment_intent_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(payment_intent_id)
        .bind(failure_reason)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(transaction)
    }

    /// Flip the transaction matched by payment-intent id to REFUNDED,
    /// recording amount and charge id. Loan balances are deliberately left
    /// alone; refunds require a manual admin correction.
    pub async fn mark_transaction_refunded(
        &self,
        payment_intent_id: &str,
        charge_id: &str,
        refund_amount: i64,
    ) -> ApiResult<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            UPDATE payment_transactions
            SET status = 'refunded',
                gateway_charge_id = $2,
                refund_amount = $3,
                refunded_at = $4,
                updated_at = $4
            WHERE gateway_payment_intent_id = $1 AND status IN ('pending', 'success')
            RETURNING *
            "#,
        )
        .bind(payment_intent_id)
        .bind(charge_id)
        .bind(refund_amount)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(transaction)
    }
}
