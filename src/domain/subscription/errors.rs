//! Subscription-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound / NotFoundForClinic | 404 |
//! | AlreadyExists | 409 |
//! | DuplicatePayment | 409 |
//! | Conflict | 409 |
//! | InvalidTier | 400 |
//! | Validation | 400 |
//! | NoPaymentMethod | 422 |
//! | DowngradeBlocked | 422 |
//! | InvalidState | 422 |
//! | PaymentDeclined | 402 |
//! | GatewayUnavailable | 503 |
//! | GatewayMisconfigured | 502 |
//! | Infrastructure | 500 |

use crate::domain::catalog::{LimitBreach, Tier};
use crate::domain::foundation::{
    ClinicId, DomainError, ErrorCode, SubscriptionId, ValidationError,
};

use super::SubscriptionStatus;

/// Subscription lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// No subscription with this id.
    NotFound(SubscriptionId),

    /// The clinic has no subscription record.
    NotFoundForClinic(ClinicId),

    /// The clinic already has a live (non-cancelled) subscription.
    AlreadyExists(ClinicId),

    /// Tier name is not in the catalog.
    InvalidTier(String),

    /// A paid payment with this gateway id was already applied.
    DuplicatePayment { gateway_payment_id: String },

    /// Auto-pay cannot be enabled without a saved payment method.
    NoPaymentMethod(SubscriptionId),

    /// Current usage exceeds the target tier's limits.
    DowngradeBlocked {
        target: Tier,
        breaches: Vec<LimitBreach>,
    },

    /// Operation not allowed in the current lifecycle state.
    InvalidState {
        current: SubscriptionStatus,
        attempted: String,
    },

    /// Optimistic-lock conflict that survived every retry.
    Conflict(String),

    /// The gateway refused the payment.
    PaymentDeclined { reason: String },

    /// The gateway could not be reached or timed out.
    GatewayUnavailable { reason: String },

    /// Credentials or request shape rejected by the gateway.
    GatewayMisconfigured { reason: String },

    /// Input failed validation.
    Validation { field: String, message: String },

    /// Infrastructure error.
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn not_found(id: SubscriptionId) -> Self {
        SubscriptionError::NotFound(id)
    }

    pub fn not_found_for_clinic(clinic_id: ClinicId) -> Self {
        SubscriptionError::NotFoundForClinic(clinic_id)
    }

    pub fn already_exists(clinic_id: ClinicId) -> Self {
        SubscriptionError::AlreadyExists(clinic_id)
    }

    pub fn invalid_tier(tier: impl Into<String>) -> Self {
        SubscriptionError::InvalidTier(tier.into())
    }

    pub fn duplicate_payment(gateway_payment_id: impl Into<String>) -> Self {
        SubscriptionError::DuplicatePayment {
            gateway_payment_id: gateway_payment_id.into(),
        }
    }

    pub fn no_payment_method(id: SubscriptionId) -> Self {
        SubscriptionError::NoPaymentMethod(id)
    }

    pub fn downgrade_blocked(target: Tier, breaches: Vec<LimitBreach>) -> Self {
        SubscriptionError::DowngradeBlocked { target, breaches }
    }

    pub fn invalid_state(current: SubscriptionStatus, attempted: impl Into<String>) -> Self {
        SubscriptionError::InvalidState {
            current,
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFound(_) | SubscriptionError::NotFoundForClinic(_) => {
                ErrorCode::SubscriptionNotFound
            }
            SubscriptionError::AlreadyExists(_) => ErrorCode::SubscriptionExists,
            SubscriptionError::InvalidTier(_) => ErrorCode::InvalidTier,
            SubscriptionError::DuplicatePayment { .. } => ErrorCode::DuplicatePayment,
            SubscriptionError::NoPaymentMethod(_) => ErrorCode::NoPaymentMethod,
            SubscriptionError::DowngradeBlocked { .. } => ErrorCode::DowngradeBlocked,
            SubscriptionError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::Conflict(_) => ErrorCode::ConcurrencyConflict,
            SubscriptionError::PaymentDeclined { .. } => ErrorCode::GatewayDeclined,
            SubscriptionError::GatewayUnavailable { .. } => ErrorCode::GatewayUnavailable,
            SubscriptionError::GatewayMisconfigured { .. } => ErrorCode::GatewayMisconfigured,
            SubscriptionError::Validation { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::NotFound(id) => format!("Subscription not found: {}", id),
            SubscriptionError::NotFoundForClinic(clinic_id) => {
                format!("No subscription found for clinic: {}", clinic_id)
            }
            SubscriptionError::AlreadyExists(clinic_id) => {
                format!("Clinic {} already has a live subscription", clinic_id)
            }
            SubscriptionError::InvalidTier(tier) => format!("Invalid tier: {}", tier),
            SubscriptionError::DuplicatePayment { gateway_payment_id } => format!(
                "Payment {} has already been applied",
                gateway_payment_id
            ),
            SubscriptionError::NoPaymentMethod(id) => format!(
                "Subscription {} has no payment method on file",
                id
            ),
            SubscriptionError::DowngradeBlocked { target, breaches } => {
                let over = breaches
                    .iter()
                    .map(|b| format!("{} ({} > {})", b.resource, b.current, b.limit))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Cannot downgrade to {}: usage exceeds {}", target, over)
            }
            SubscriptionError::InvalidState { current, attempted } => {
                format!("Cannot {} a subscription in {} state", attempted, current)
            }
            SubscriptionError::Conflict(msg) => format!("Concurrent update: {}", msg),
            SubscriptionError::PaymentDeclined { reason } => {
                format!("Payment declined: {}", reason)
            }
            SubscriptionError::GatewayUnavailable { reason } => {
                format!("Payment gateway unavailable: {}", reason)
            }
            SubscriptionError::GatewayMisconfigured { reason } => {
                format!("Payment gateway misconfigured: {}", reason)
            }
            SubscriptionError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            SubscriptionError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::Conflict(_)
                | SubscriptionError::GatewayUnavailable { .. }
                | SubscriptionError::Infrastructure(_)
        )
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SubscriptionError {}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ConcurrencyConflict => SubscriptionError::Conflict(err.message),
            ErrorCode::DuplicatePayment => SubscriptionError::DuplicatePayment {
                gateway_payment_id: err
                    .details
                    .get("gateway_payment_id")
                    .cloned()
                    .unwrap_or_default(),
            },
            ErrorCode::ValidationFailed => SubscriptionError::Validation {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            ErrorCode::InvalidTier => SubscriptionError::InvalidTier(err.message),
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for SubscriptionError {
    fn from(err: ValidationError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        let domain = DomainError::new(err.code(), err.message());
        match err {
            SubscriptionError::DuplicatePayment { gateway_payment_id } => {
                domain.with_detail("gateway_payment_id", gateway_payment_id)
            }
            SubscriptionError::DowngradeBlocked { target, .. } => {
                domain.with_detail("target_tier", target.as_str())
            }
            SubscriptionError::InvalidState { current, .. } => {
                domain.with_detail("status", current.as_str())
            }
            SubscriptionError::Validation { field, .. } => domain.with_detail("field", field),
            _ => domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::LimitedResource;

    #[test]
    fn duplicate_payment_keeps_gateway_id_through_domain_error() {
        let err = SubscriptionError::duplicate_payment("pay_123");
        let domain: DomainError = err.clone().into();

        assert_eq!(domain.code, ErrorCode::DuplicatePayment);
        assert_eq!(SubscriptionError::from(domain), err);
    }

    #[test]
    fn conflict_round_trips_through_domain_error() {
        let domain = DomainError::new(ErrorCode::ConcurrencyConflict, "version mismatch");
        let err = SubscriptionError::from(domain);
        assert_eq!(err, SubscriptionError::Conflict("version mismatch".to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn declines_are_not_retryable_but_outages_are() {
        assert!(!SubscriptionError::PaymentDeclined {
            reason: "insufficient funds".into()
        }
        .is_retryable());
        assert!(SubscriptionError::GatewayUnavailable {
            reason: "timeout".into()
        }
        .is_retryable());
    }

    #[test]
    fn downgrade_message_lists_breaches() {
        let err = SubscriptionError::downgrade_blocked(
            Tier::Core,
            vec![LimitBreach {
                resource: LimitedResource::Patients,
                limit: 500,
                current: 600,
            }],
        );
        assert_eq!(
            err.message(),
            "Cannot downgrade to CORE: usage exceeds patients (600 > 500)"
        );
        assert_eq!(err.code(), ErrorCode::DowngradeBlocked);
    }

    #[test]
    fn unknown_domain_codes_become_infrastructure() {
        let err = SubscriptionError::from(DomainError::database("connection reset"));
        assert!(matches!(err, SubscriptionError::Infrastructure(_)));
    }

    #[test]
    fn invalid_state_mentions_status() {
        let err = SubscriptionError::invalid_state(SubscriptionStatus::Cancelled, "pay for");
        assert_eq!(
            err.message(),
            "Cannot pay for a subscription in CANCELLED state"
        );
    }
}
