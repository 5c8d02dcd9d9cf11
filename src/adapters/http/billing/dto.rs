//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::subscription::{
    PaymentOutcome, ProcessPaymentResult, SubscriptionSnapshot,
};
use crate::domain::catalog::{Feature, Tier};
use crate::domain::entitlement::{AccessDecision, DenialReason};
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{PaymentRecord, PaymentStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Admin-entered payment.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessPaymentRequest {
    pub amount_minor: i64,
    /// Defaults to the catalog currency.
    #[serde(default)]
    pub currency: Option<String>,
    pub new_tier: String,
    /// e.g. `upi`, `cash`, `bank_transfer`.
    pub payment_method: String,
    /// Falls back to the `Idempotency-Key` header, then a generated id.
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeTierRequest {
    pub tier: String,
    /// Remove the Intelligence add-on instead of changing the ladder tier.
    #[serde(default)]
    pub drop_intelligence: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetAutoPayRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachPaymentMethodRequest {
    /// Gateway token for the saved instrument.
    pub token: String,
}

/// `enabled: null` (or omitted) clears the override.
#[derive(Debug, Clone, Deserialize)]
pub struct SetOverrideRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// One ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub subscription_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    pub method: String,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub description: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id.to_string(),
            subscription_id: record.subscription_id.to_string(),
            amount_minor: record.amount.amount_minor(),
            currency: record.amount.currency().to_string(),
            status: record.status,
            gateway_payment_id: record.gateway_payment_id.map(|id| id.as_str().to_string()),
            method: record.method,
            paid_at: record.paid_at,
            created_at: record.created_at,
            description: record.description,
            failure_reason: record.failure_reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryResponse {
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessPaymentResponse {
    pub outcome: PaymentOutcome,
    pub subscription: SubscriptionSnapshot,
    pub payment: PaymentResponse,
}

impl ProcessPaymentResponse {
    pub fn new(result: ProcessPaymentResult, now: Timestamp) -> Self {
        Self {
            outcome: result.outcome,
            subscription: SubscriptionSnapshot::of(&result.subscription, now),
            payment: PaymentResponse::from(result.payment),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeTierResponse {
    pub subscription: SubscriptionSnapshot,
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub changed: bool,
}

/// Body of `GET /entitlements/:feature`. Sent with 200 or 403.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAccessResponse {
    pub feature: Feature,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub via_override: bool,
}

impl From<AccessDecision> for FeatureAccessResponse {
    fn from(decision: AccessDecision) -> Self {
        match decision {
            AccessDecision::Allowed {
                feature,
                via_override,
            } => Self {
                feature,
                allowed: true,
                required_tier: None,
                reason: None,
                via_override,
            },
            AccessDecision::Denied {
                feature,
                required_tier,
                reason,
            } => Self {
                feature,
                allowed: false,
                required_tier: Some(required_tier),
                reason: Some(reason),
                via_override: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub outcome: &'static str,
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
