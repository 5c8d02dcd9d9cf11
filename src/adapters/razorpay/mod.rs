//! Razorpay payment gateway adapter.
//!
//! - `RazorpayGateway` charges saved tokens for renewals
//! - `RazorpayWebhookVerifier` checks `X-Razorpay-Signature` and parses
//!   `payment.captured` / `payment.failed` notifications
//! - `MockPaymentGateway` is the scripted test double
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - All secrets are handled via `secrecy::SecretString`

mod gateway;
mod mock_gateway;
mod webhook;

pub use gateway::{RazorpayConfig, RazorpayGateway};
pub use mock_gateway::MockPaymentGateway;
pub use webhook::{RazorpayWebhookVerifier, WebhookError, SIGNATURE_HEADER};
