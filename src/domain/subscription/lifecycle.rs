//! Inputs and outputs of the lifecycle transition function.

use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Something that happened to a subscription.
///
/// Time-driven events (`RenewalCharged`, `RenewalFailed`, `GraceElapsed`,
/// `PaymentMethodMissing`, `PeriodEnded`, `TrialExpired`) are no-ops when
/// their deadline has not yet passed, so replaying them is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A `paid` payment was recorded by the processor.
    PaymentReceived,
    /// Auto-pay succeeded at the period boundary.
    RenewalCharged,
    /// Auto-pay was declined, retries ran out, or no manual payment came in.
    RenewalFailed,
    /// The grace window closed without payment.
    GraceElapsed,
    /// Auto-pay is on but there is nothing to charge.
    PaymentMethodMissing,
    /// `cancel_at_period_end` reached the period boundary.
    PeriodEnded,
    /// The trial ran out with no way to bill.
    TrialExpired,
    /// Clinic deactivated.
    AdministrativeCancel,
}

/// Result of applying a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub period_advanced: bool,
}

impl Transition {
    pub(crate) fn unchanged(status: SubscriptionStatus) -> Self {
        Self {
            from: status,
            to: status,
            period_advanced: false,
        }
    }

    /// False when the event was a no-op.
    pub fn changed(&self) -> bool {
        self.from != self.to || self.period_advanced
    }
}

/// What the sweep should do for a subscription right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueAction {
    /// Charge the saved payment method for the next period.
    ChargeRenewal,
    /// Auto-pay is off and the period ended unpaid.
    EnterGrace,
    /// Trial over, tier chosen manually, waiting on a manual payment.
    AwaitManualPayment,
    /// The grace window closed unpaid.
    EndGrace,
    /// Auto-pay is on but no payment method is saved.
    SuspendWithoutPaymentMethod,
    /// The clinic asked to cancel at period end.
    Cancel,
    /// Trial over with no payment method and no manual tier.
    ExpireTrial,
}

impl DueAction {
    /// The event that the action resolves to when no charge is involved.
    pub fn event(&self) -> LifecycleEvent {
        match self {
            DueAction::ChargeRenewal => LifecycleEvent::RenewalCharged,
            DueAction::EnterGrace | DueAction::AwaitManualPayment => LifecycleEvent::RenewalFailed,
            DueAction::EndGrace => LifecycleEvent::GraceElapsed,
            DueAction::SuspendWithoutPaymentMethod => LifecycleEvent::PaymentMethodMissing,
            DueAction::Cancel => LifecycleEvent::PeriodEnded,
            DueAction::ExpireTrial => LifecycleEvent::TrialExpired,
        }
    }
}
