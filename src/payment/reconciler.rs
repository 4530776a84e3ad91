//! Webhook reconciler - applies gateway events to the installment ledger
//! and loan aggregate exactly once in effect.
//!
//! Gateway events are delivered at least once and in no guaranteed order.
//! Authenticity is checked against the raw body before any field is
//! trusted. Settlement runs in one database transaction with a
//! compare-and-swap on the installment status, so duplicate or concurrent
//! deliveries of the same success event become no-ops instead of double
//! mutating loan balances.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::error::{ApiError, ApiResult};
use crate::installment::InstallmentService;
use crate::loan::LoanService;
use crate::notification::{ConfirmationDetails, FailureDetails, NotificationSender};
use crate::payment::gateway::verify_signature;
use crate::payment::{
    ChargeRefundedData, CheckoutCompletedData, GatewayEvent, PaymentIntentFailedData,
    PaymentIntentSucceededData, PaymentService, SessionMetadata, WebhookEnvelope,
};

/// Webhook reconciler service
#[derive(Clone)]
pub struct WebhookReconciler {
    db_pool: PgPool,
    installment_service: InstallmentService,
    loan_service: LoanService,
    payment_service: PaymentService,
    notifier: Arc<dyn NotificationSender>,
    webhook_secret: Option<String>,
    portal_base_url: String,
}

impl WebhookReconciler {
    /// Create a new reconciler instance
    pub fn new(
        db_pool: PgPool,
        installment_service: InstallmentService,
        loan_service: LoanService,
        payment_service: PaymentService,
        notifier: Arc<dyn NotificationSender>,
        webhook_secret: Option<String>,
        portal_base_url: String,
    ) -> Self {
        Self {
            db_pool,
            installment_service,
            loan_service,
            payment_service,
            notifier,
            webhook_secret,
            portal_base_url,
        }
    }

    /// Process one inbound webhook delivery.
    ///
    /// Signature verification failures are fatal to the request and mutate
    /// nothing. Once the signature passes, the event is acknowledged
    /// (`Ok`) regardless of internal processing outcome - a missing local
    /// record is unrecoverable and gateway retries would not fix it.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> ApiResult<()> {
        match &self.webhook_secret {
            Some(secret) => {
                let header = signature_header.ok_or_else(|| {
                    ApiError::InvalidSignature("Missing signature header".to_string())
                })?;
                verify_signature(raw_body, header, secret)
                    .map_err(|e| ApiError::InvalidSignature(e.to_string()))?;
            }
            None => {
                // Dev-mode path: without a configured secret the payload is
                // trusted as-is. Not a security guarantee.
                tracing::warn!(
                    "GATEWAY_WEBHOOK_SECRET not configured - accepting webhook without verification"
                );
            }
        }

        let envelope: WebhookEnvelope = match serde_json::from_slice(raw_body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "Webhook body is not a valid event envelope");
                return Ok(());
            }
        };

        let event_id = envelope.id.clone();
        let event = match envelope.into_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Webhook payload malformed for its event type");
                return Ok(());
            }
        };

        if let Err(e) = self.process_event(event).await {
            tracing::error!(event_id = %event_id, error = %e, "Webhook event failed to apply");
        }

        Ok(())
    }

    async fn process_event(&self, event: GatewayEvent) -> ApiResult<()> {
        match event {
            GatewayEvent::CheckoutCompleted(data) => self.on_checkout_completed(data).await,
            GatewayEvent::PaymentIntentSucceeded(data) => self.on_intent_succeeded(data).await,
            GatewayEvent::PaymentIntentFailed(data) => self.on_intent_failed(data).await,
            GatewayEvent::ChargeRefunded(data) => self.on_charge_refunded(data).await,
            GatewayEvent::Unrecognized(kind) => {
                tracing::debug!(event_type = %kind, "Ignoring unrecognized gateway event");
                Ok(())
            }
        }
    }

    async fn on_checkout_completed(&self, data: CheckoutCompletedData) -> ApiResult<()> {
        self.apply_settlement(
            &data.metadata,
            Some(&data.session_id),
            data.payment_intent_id.as_deref(),
            data.receipt_url,
        )
        .await
    }

    async fn on_intent_succeeded(&self, data: PaymentIntentSucceededData) -> ApiResult<()> {
        self.apply_settlement(
            &data.metadata,
            None,
            Some(&data.payment_intent_id),
            data.receipt_url,
        )
        .await
    }

    /// Settle one installment from a success event.
    ///
    /// Installment CAS, loan aggregate update, and transaction flip commit
    /// together or not at all. The pre-read of the installment makes the
    /// common duplicate-delivery case a cheap no-op; the CAS inside the
    /// transaction closes the race between two concurrent deliveries.
    async fn apply_settlement(
        &self,
        metadata: &SessionMetadata,
        session_id: Option<&str>,
        payment_intent_id: Option<&str>,
        receipt_url: Option<String>,
    ) -> ApiResult<()> {
        let installment = match self
            .installment_service
            .get_installment(&metadata.installment_id)
            .await
        {
            Ok(installment) => installment,
            Err(ApiError::NotFound(_)) => {
                tracing::error!(
                    installment_id = %metadata.installment_id,
                    "Success event references an unknown installment"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if installment.status.is_settled() {
            tracing::info!(
                installment_id = %installment.id,
                status = ?installment.status,
                "Duplicate success event for settled installment - no-op"
            );
            return Ok(());
        }

        let mut tx = self.db_pool.begin().await?;

        let paid = match self
            .installment_service
            .mark_paid(&mut *tx, &installment.id, Utc::now(), payment_intent_id)
            .await
        {
            Ok(paid) => paid,
            Err(ApiError::InvalidTransition(_)) => {
                // Lost the race to a concurrent delivery of the same event
                tracing::info!(
                    installment_id = %installment.id,
                    "Installment settled concurrently - no-op"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let loan = self
            .loan_service
            .apply_successful_payment(&mut *tx, &metadata.loan_id, &paid)
            .await?;

        let flipped = match session_id {
            Some(session_id) => {
                self.payment_service
                    .mark_transaction_success(&mut *tx, session_id, payment_intent_id)
                    .await?
            }
            None => match payment_intent_id {
                Some(intent_id) => {
                    self.payment_service
                        .mark_transaction_success_by_intent(&mut *tx, intent_id)
                        .await?
                }
                None => None,
            },
        };

        if flipped.is_none() {
            tracing::warn!(
                installment_id = %installment.id,
                "No pending payment transaction matched the success event"
            );
        }

        tx.commit().await?;

        tracing::info!(
            installment_id = %paid.id,
            loan_id = %loan.id,
            amount = paid.amount,
            fine = paid.fine_amount,
            outstanding = loan.outstanding_balance,
            "Payment reconciled"
        );

        // Fire-and-forget relative to the webhook response
        let notifier = self.notifier.clone();
        let recipient = paid.borrower_id;
        let details = ConfirmationDetails {
            installment_number: paid.installment_number,
            amount: paid.amount,
            outstanding_balance: loan.outstanding_balance,
            receipt_url,
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.send_payment_confirmation(recipient, details).await {
                tracing::warn!(error = %e, "Payment confirmation could not be sent");
            }
        });

        Ok(())
    }

    /// A failed intent only touches the audit record; the installment
    /// stays payable.
    async fn on_intent_failed(&self, data: PaymentIntentFailedData) -> ApiResult<()> {
        let transaction = self
            .payment_service
            .mark_transaction_failed(&data.payment_intent_id, data.failure_reason.as_deref())
            .await?;

        let Some(transaction) = transaction else {
            tracing::warn!(
                payment_intent_id = %data.payment_intent_id,
                "Failed event matched no pending transaction"
            );
            return Ok(());
        };

        tracing::info!(
            transaction_id = %transaction.id,
            reason = ?data.failure_reason,
            "Payment attempt failed"
        );

        let retry_url = self.mint_retry_link(&transaction.installment_id).await;

        let notifier = self.notifier.clone();
        let recipient = transaction.borrower_id;
        let details = FailureDetails {
            failure_reason: data.failure_reason,
            retry_url,
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.send_payment_failed(recipient, details).await {
                tracing::warn!(error = %e, "Payment failure notice could not be sent");
            }
        });

        Ok(())
    }

    /// Best-effort fresh checkout link for the failure notice. A gateway
    /// or lookup error never blocks the notice itself.
    async fn mint_retry_link(&self, installment_id: &uuid::Uuid) -> Option<String> {
        let installment = match self.installment_service.get_installment(installment_id).await {
            Ok(installment) => installment,
            Err(e) => {
                tracing::warn!(
                    installment_id = %installment_id,
                    error = %e,
                    "Could not load installment for retry link"
                );
                return None;
            }
        };

        if installment.status.is_settled() {
            return None;
        }

        let success_url = format!("{}/payments/success", self.portal_base_url);
        let cancel_url = format!("{}/payments/cancel", self.portal_base_url);

        match self
            .payment_service
            .create_session_for_sweep(&installment, &success_url, &cancel_url)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(
                    installment_id = %installment_id,
                    error = %e,
                    "Could not create retry session for failure notice"
                );
                None
            }
        }
    }

    /// Refunds update the audit record only. Loan balances and installment
    /// status are left for manual admin correction - an automated reversal
    /// policy needs product sign-off first.
    async fn on_charge_refunded(&self, data: ChargeRefundedData) -> ApiResult<()> {
        let transaction = self
            .payment_service
            .mark_transaction_refunded(
                &data.payment_intent_id,
                &data.charge_id,
                data.refund_amount,
            )
            .await?;

        match transaction {
            Some(transaction) => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    loan_id = %transaction.loan_id,
                    refund_amount = data.refund_amount,
                    "Charge refunded; loan balances need manual review"
                );
            }
            None => {
                tracing::warn!(
                    payment_intent_id = %data.payment_intent_id,
                    "Refund event matched no known transaction"
                );
            }
        }

        Ok(())
    }
}
