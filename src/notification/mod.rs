//! Notification collaborator interface
//!
//! Email delivery and templating live in an external system; this module
//! only defines the seam. Failures are logged by callers and never fed
//! back into control flow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Details for an upcoming-due reminder
#[derive(Debug, Clone)]
pub struct ReminderDetails {
    pub installment_number: i32,
    pub amount: i64,
    pub due_date: DateTime<Utc>,
    pub days_until_due: i64,
    pub payment_url: Option<String>,
}

/// Details for an overdue notice
#[derive(Debug, Clone)]
pub struct OverdueDetails {
    pub installment_number: i32,
    pub amount: i64,
    pub fine_amount: i64,
    pub total_due: i64,
    pub days_overdue: i64,
    pub payment_url: Option<String>,
}

/// Details for a payment confirmation
#[derive(Debug, Clone)]
pub struct ConfirmationDetails {
    pub installment_number: i32,
    pub amount: i64,
    pub outstanding_balance: i64,
    pub receipt_url: Option<String>,
}

/// Details for a failed-payment notice
#[derive(Debug, Clone)]
pub struct FailureDetails {
    pub failure_reason: Option<String>,
    pub retry_url: Option<String>,
}

/// Outbound notification sender
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_installment_reminder(
        &self,
        recipient: Uuid,
        details: ReminderDetails,
    ) -> anyhow::Result<()>;

    async fn send_overdue_notice(
        &self,
        recipient: Uuid,
        details: OverdueDetails,
    ) -> anyhow::Result<()>;

    async fn send_payment_confirmation(
        &self,
        recipient: Uuid,
        details: ConfirmationDetails,
    ) -> anyhow::Result<()>;

    async fn send_payment_failed(
        &self,
        recipient: Uuid,
        details: FailureDetails,
    ) -> anyhow::Result<()>;
}

/// Notifier that records sends in the log. Stands in for the external
/// email system in deployments where it is not wired up.
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send_installment_reminder(
        &self,
        recipient: Uuid,
        details: ReminderDetails,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient,
            installment = details.installment_number,
            amount = details.amount,
            days_until_due = details.days_until_due,
            "Installment reminder sent"
        );
        Ok(())
    }

    async fn send_overdue_notice(
        &self,
        recipient: Uuid,
        details: OverdueDetails,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient,
            installment = details.installment_number,
            total_due = details.total_due,
            days_overdue = details.days_overdue,
            "Overdue notice sent"
        );
        Ok(())
    }

    async fn send_payment_confirmation(
        &self,
        recipient: Uuid,
        details: ConfirmationDetails,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient,
            installment = details.installment_number,
            amount = details.amount,
            outstanding = details.outstanding_balance,
            "Payment confirmation sent"
        );
        Ok(())
    }

    async fn send_payment_failed(
        &self,
        recipient: Uuid,
        details: FailureDetails,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient,
            reason = ?details.failure_reason,
            "Payment failure notice sent"
        );
        Ok(())
    }
}
