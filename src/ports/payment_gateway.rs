//! Payment gateway port.
//!
//! Charges a saved payment method. Transport failures and business
//! declines are separate error kinds: only a decline may move a
//! subscription into grace.
//!
//! # Design
//!
//! - **Idempotent**: the gateway collapses charges with the same key
//! - **Bounded**: callers wrap `charge` in a timeout

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::Money;
use crate::domain::subscription::{GatewayPaymentId, PaymentMethodRef, SubscriptionError};

/// Port for charging saved payment methods.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name recorded as the payment method on ledger entries.
    fn name(&self) -> &'static str;

    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Money,
    pub method: PaymentMethodRef,
    pub idempotency_key: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub gateway_payment_id: GatewayPaymentId,
}

/// Why a charge did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Timeout, connection failure, 5xx or rate limit. Safe to retry.
    #[error("gateway transport failure: {reason}")]
    Transport { reason: String },

    /// The gateway refused the payment.
    #[error("payment declined: {reason}")]
    Declined {
        reason: String,
        gateway_payment_id: Option<GatewayPaymentId>,
    },

    /// Credentials or request rejected. Retrying will not help.
    #[error("gateway misconfigured: {reason}")]
    Misconfigured { reason: String },
}

impl GatewayError {
    pub fn transport(reason: impl Into<String>) -> Self {
        GatewayError::Transport {
            reason: reason.into(),
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        GatewayError::Declined {
            reason: reason.into(),
            gateway_payment_id: None,
        }
    }

    pub fn misconfigured(reason: impl Into<String>) -> Self {
        GatewayError::Misconfigured {
            reason: reason.into(),
        }
    }

    /// Only transport failures are retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport { .. })
    }
}

impl From<GatewayError> for SubscriptionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport { reason } => SubscriptionError::GatewayUnavailable { reason },
            GatewayError::Declined { reason, .. } => SubscriptionError::PaymentDeclined { reason },
            GatewayError::Misconfigured { reason } => {
                SubscriptionError::GatewayMisconfigured { reason }
            }
        }
    }
}
