//! Payment transaction models and gateway wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment transaction status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Refunded,
    Cancelled,
}

/// Audit record of one attempt to pay one installment.
///
/// References the installment and loan rather than embedding them, so the
/// audit trail survives independent of ledger mutation ordering. Multiple
/// PENDING transactions may exist for one installment (retries); the
/// reconciler's installment-status check is what keeps SUCCESS unique.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub installment_id: Uuid,
    pub loan_id: Uuid,
    pub borrower_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub gateway_session_id: String,
    pub gateway_payment_intent_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_amount: Option<i64>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Opaque metadata attached to a checkout session so webhook events can be
/// routed back to the installment that created them
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub installment_id: Uuid,
    pub loan_id: Uuid,
    pub borrower_id: Uuid,
    pub installment_number: i32,
}

/// A hosted checkout session created on the gateway
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

/// Gateway-side view of a session, as returned by session retrieval
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub metadata: SessionMetadata,
    pub amount_total: i64,
}

/// Result of a gateway refund call
#[derive(Debug, Deserialize, Clone)]
pub struct RefundDetails {
    pub id: String,
    pub amount: i64,
}

/// Request to create a checkout session for an installment
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
}

/// Response DTO for session creation
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub url: String,
    pub amount: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

/// Raw webhook envelope: the event type is matched as a string so that
/// unrecognized types can be acknowledged and ignored without failing
/// deserialization.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Payload of a `checkout.completed` event
#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutCompletedData {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub metadata: SessionMetadata,
    pub amount_total: i64,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

/// Payload of a `payment_intent.succeeded` event. Settlement metadata is
/// carried the same way as on checkout completion.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentIntentSucceededData {
    pub payment_intent_id: String,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

/// Payload of a `payment_intent.failed` event
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentIntentFailedData {
    pub payment_intent_id: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Payload of a `charge.refunded` event
#[derive(Debug, Deserialize, Clone)]
pub struct ChargeRefundedData {
    pub charge_id: String,
    pub payment_intent_id: String,
    pub refund_amount: i64,
}

/// Parsed, typed gateway event
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    CheckoutCompleted(CheckoutCompletedData),
    PaymentIntentSucceeded(PaymentIntentSucceededData),
    PaymentIntentFailed(PaymentIntentFailedData),
    ChargeRefunded(ChargeRefundedData),
    Unrecognized(String),
}

impl WebhookEnvelope {
    /// Resolve the envelope into a typed event. Unknown event types map to
    /// `Unrecognized` rather than an error; a known type with a malformed
    /// payload is an error.
    pub fn into_event(self) -> Result<GatewayEvent, serde_json::Error> {
        let event = match self.event_type.as_str() {
            "checkout.completed" => {
                GatewayEvent::CheckoutCompleted(serde_json::from_value(self.data)?)
            }
            "payment_intent.succeeded" => {
                GatewayEvent::PaymentIntentSucceeded(serde_json::from_value(self.data)?)
            }
            "payment_intent.failed" => {
                GatewayEvent::PaymentIntentFailed(serde_json::from_value(self.data)?)
            }
            "charge.refunded" => GatewayEvent::ChargeRefunded(serde_json::from_value(self.data)?),
            _ => GatewayEvent::Unrecognized(self.event_type),
        };
        Ok(event)
    }
}
