//! Payment domain module
//!
//! Contains the payment-gateway client, the session broker, the webhook
//! reconciler, and the payment transaction audit models.

pub mod gateway;
mod model;
mod reconciler;
mod service;

pub use gateway::{verify_signature, HttpGateway, PaymentGateway, SimulatedGateway};
pub use model::*;
pub use reconciler::WebhookReconciler;
pub use service::{PaymentService, SessionVerification};
