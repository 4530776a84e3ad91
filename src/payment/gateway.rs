//! Payment gateway client
//!
//! The gateway is an external collaborator reached over HTTP. It is modeled
//! as a trait so services take an injected implementation: the live
//! `HttpGateway` in production, `SimulatedGateway` when no API key is
//! configured, and fakes in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use crate::payment::{CheckoutSession, RefundDetails, SessionDetails, SessionMetadata};

type HmacSha256 = Hmac<Sha256>;

/// Accepted skew between the signed timestamp and local time. A valid
/// signature outside this window is treated as a replay.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Webhook signature verification failure
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("Signature timestamp is {0}s from local time, outside tolerance")]
    Stale(i64),

    #[error("Signature does not match payload")]
    Mismatch,
}

/// Verify a webhook signature header against the raw request body.
///
/// The header carries `t=<unix-ts>,v1=<hex-hmac>`; the HMAC-SHA256 is
/// computed with the shared secret over `"<t>.<raw body>"`. Verification
/// must run on the raw, unparsed bytes - parsing the body first changes
/// the byte stream and the check will fail.
pub fn verify_signature(
    raw_body: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    verify_signature_at(raw_body, signature_header, secret, Utc::now().timestamp())
}

/// Verify a signature header against an explicit local clock reading.
///
/// The signed timestamp must also fall within `SIGNATURE_TOLERANCE_SECS`
/// of `now_ts`: the timestamp is covered by the HMAC, so a stale-but-valid
/// header is a captured payload being replayed, not clock drift.
pub fn verify_signature_at(
    raw_body: &[u8],
    signature_header: &str,
    secret: &str,
    now_ts: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| SignatureError::MalformedHeader("missing timestamp".to_string()))?;
    let signature = signature
        .ok_or_else(|| SignatureError::MalformedHeader("missing v1 signature".to_string()))?;
    let expected = hex::decode(signature)
        .map_err(|_| SignatureError::MalformedHeader("v1 is not hex".to_string()))?;
    let timestamp_secs: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader("timestamp is not numeric".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedHeader("invalid secret length".to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);

    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)?;

    let skew = (now_ts - timestamp_secs).abs();
    if skew > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Stale(skew));
    }

    Ok(())
}

/// Build a signature header for a payload. Used by the simulated gateway
/// and tests; the live gateway signs on its side.
pub fn sign_payload(raw_body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Parameters for creating a hosted checkout session
#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckoutParams {
    pub description: String,
    pub amount: i64,
    pub currency: String,
    pub metadata: SessionMetadata,
    pub success_url: String,
    pub cancel_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Payment gateway client interface
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session for an exact amount
    async fn create_checkout_session(&self, params: CreateCheckoutParams)
        -> Result<CheckoutSession>;

    /// Retrieve a session's current state from the gateway
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails>;

    /// Issue a refund against a payment intent
    async fn refund(&self, payment_intent_id: &str, reason: &str) -> Result<RefundDetails>;
}

/// Live HTTP gateway client
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("Gateway returned {}: {}", status, body))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_checkout_session(
        &self,
        params: CreateCheckoutParams,
    ) -> Result<CheckoutSession> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&params)
            .send()
            .await
            .context("Failed to reach payment gateway")?;

        let session = Self::check_response(response)
            .await?
            .json::<CheckoutSession>()
            .await
            .context("Gateway returned an unparseable session")?;

        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach payment gateway")?;

        let details = Self::check_response(response)
            .await?
            .json::<SessionDetails>()
            .await
            .context("Gateway returned unparseable session details")?;

        Ok(details)
    }

    async fn refund(&self, payment_intent_id: &str, reason: &str) -> Result<RefundDetails> {
        let response = self
            .client
            .post(format!("{}/refunds", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "payment_intent_id": payment_intent_id,
                "reason": reason,
            }))
            .send()
            .await
            .context("Failed to reach payment gateway")?;

        let refund = Self::check_response(response)
            .await?
            .json::<RefundDetails>()
            .await
            .context("Gateway returned an unparseable refund")?;

        Ok(refund)
    }
}

/// In-process gateway used when no API key is configured (dev mode).
/// Sessions live in memory and are never actually payable.
#[derive(Default)]
pub struct SimulatedGateway {
    sessions: Mutex<HashMap<String, SessionDetails>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn random_id(prefix: &str) -> String {
        let suffix: u64 = rand::thread_rng().gen();
        format!("{}_sim_{:016x}", prefix, suffix)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_checkout_session(
        &self,
        params: CreateCheckoutParams,
    ) -> Result<CheckoutSession> {
        let session_id = Self::random_id("cs");
        let payment_intent_id = Self::random_id("pi");

        let details = SessionDetails {
            id: session_id.clone(),
            payment_status: "unpaid".to_string(),
            payment_intent_id: Some(payment_intent_id.clone()),
            metadata: params.metadata.clone(),
            amount_total: params.amount,
        };

        self.sessions
            .lock()
            .expect("simulated gateway lock poisoned")
            .insert(session_id.clone(), details);

        tracing::warn!(
            session_id = %session_id,
            amount = params.amount,
            "Using simulated checkout session - configure GATEWAY_API_KEY for live payments"
        );

        Ok(CheckoutSession {
            url: format!("https://pay.example.test/session/{}", session_id),
            id: session_id,
            payment_intent_id: Some(payment_intent_id),
            amount: params.amount,
            currency: params.currency,
            expires_at: params.expires_at,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails> {
        self.sessions
            .lock()
            .expect("simulated gateway lock poisoned")
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("No such session: {}", session_id))
    }

    async fn refund(&self, _payment_intent_id: &str, _reason: &str) -> Result<RefundDetails> {
        Ok(RefundDetails {
            id: Self::random_id("re"),
            amount: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"id":"evt_1","type":"checkout.completed","data":{}}"#;
        let header = sign_payload(body, SECRET, 1_700_000_000);
        assert!(verify_signature_at(body, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = br#"{"amount": 9025}"#;
        let header = sign_payload(body, SECRET, 1_700_000_000);
        let tampered = br#"{"amount": 1}"#;
        assert_eq!(
            verify_signature_at(tampered, &header, SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let header = sign_payload(body, SECRET, 1_700_000_000);
        assert_eq!(
            verify_signature_at(body, &header, "whsec_other", 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"payload";
        let now = 1_700_000_000;

        // A valid signature minted long ago is a replay, not clock drift
        let header = sign_payload(body, SECRET, 0);
        assert_eq!(
            verify_signature_at(body, &header, SECRET, now),
            Err(SignatureError::Stale(now))
        );

        // Just past the tolerance window, both behind and ahead
        let header = sign_payload(body, SECRET, now);
        assert_eq!(
            verify_signature_at(body, &header, SECRET, now + SIGNATURE_TOLERANCE_SECS + 1),
            Err(SignatureError::Stale(SIGNATURE_TOLERANCE_SECS + 1))
        );
        assert_eq!(
            verify_signature_at(body, &header, SECRET, now - SIGNATURE_TOLERANCE_SECS - 1),
            Err(SignatureError::Stale(SIGNATURE_TOLERANCE_SECS + 1))
        );
    }

    #[test]
    fn test_skew_within_tolerance_accepted() {
        let body = b"payload";
        let now = 1_700_000_000;
        let header = sign_payload(body, SECRET, now - SIGNATURE_TOLERANCE_SECS);
        assert!(verify_signature_at(body, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_non_numeric_timestamp_rejected() {
        let body = b"payload";
        let header = sign_payload(body, SECRET, 1_700_000_000).replace("t=1700000000", "t=soon");
        assert!(matches!(
            verify_signature_at(body, &header, SECRET, 1_700_000_000),
            Err(SignatureError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let body = b"payload";
        assert!(matches!(
            verify_signature(body, "v1=deadbeef", SECRET),
            Err(SignatureError::MalformedHeader(_))
        ));
        assert!(matches!(
            verify_signature(body, "t=123", SECRET),
            Err(SignatureError::MalformedHeader(_))
        ));
        assert!(matches!(
            verify_signature(body, "t=123,v1=nothex", SECRET),
            Err(SignatureError::MalformedHeader(_))
        ));
    }

    fn params() -> CreateCheckoutParams {
        CreateCheckoutParams {
            description: "Installment 1".to_string(),
            amount: 9025,
            currency: "pkr".to_string(),
            metadata: SessionMetadata {
                installment_id: Uuid::new_v4(),
                loan_id: Uuid::new_v4(),
                borrower_id: Uuid::new_v4(),
                installment_number: 1,
            },
            success_url: "https://app.example.test/success".to_string(),
            cancel_url: "https://app.example.test/cancel".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_simulated_gateway_roundtrip() {
        let gateway = SimulatedGateway::new();
        let params = params();
        let metadata = params.metadata.clone();

        let session = gateway.create_checkout_session(params).await.unwrap();
        assert!(session.id.starts_with("cs_sim_"));
        assert_eq!(session.amount, 9025);

        let details = gateway.retrieve_session(&session.id).await.unwrap();
        assert_eq!(details.metadata, metadata);
        assert_eq!(details.amount_total, 9025);
        assert_eq!(details.payment_status, "unpaid");
    }

    #[tokio::test]
    async fn test_simulated_session_ids_are_unique() {
        let gateway = SimulatedGateway::new();
        let first = gateway.create_checkout_session(params()).await.unwrap();
        let second = gateway.create_checkout_session(params()).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_simulated_unknown_session_errors() {
        let gateway = SimulatedGateway::new();
        assert!(gateway.retrieve_session("cs_missing").await.is_err());
    }
}
