//! Payment ledger entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Money, PaymentId, SubscriptionId, Timestamp, ValidationError};

/// Payment reference issued by the gateway. Idempotency key for payment
/// application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayPaymentId(String);

impl GatewayPaymentId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::empty_field("gateway_payment_id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayPaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saved, chargeable payment method (gateway token).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethodRef(String);

impl PaymentMethodRef {
    pub fn new(token: impl Into<String>) -> Result<Self, ValidationError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(ValidationError::empty_field("payment_method"));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub gateway_payment_id: Option<GatewayPaymentId>,
    /// How the payment was made, e.g. `razorpay`, `upi`, `cash`.
    pub method: String,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub description: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentRecord {
    /// A settled payment.
    pub fn paid(
        subscription_id: SubscriptionId,
        amount: Money,
        gateway_payment_id: GatewayPaymentId,
        method: impl Into<String>,
        description: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            subscription_id,
            amount,
            status: PaymentStatus::Paid,
            gateway_payment_id: Some(gateway_payment_id),
            method: method.into(),
            paid_at: Some(now),
            created_at: now,
            description,
            failure_reason: None,
        }
    }

    /// A declined or abandoned attempt. Never counts toward idempotency.
    pub fn failed(
        subscription_id: SubscriptionId,
        amount: Money,
        gateway_payment_id: Option<GatewayPaymentId>,
        method: impl Into<String>,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            subscription_id,
            amount,
            status: PaymentStatus::Failed,
            gateway_payment_id,
            method: method.into(),
            paid_at: None,
            created_at: now,
            description: None,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}
