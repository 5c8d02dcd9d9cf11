//! Subscription domain events.
//!
//! Emitted after a change is committed. Used for:
//! - Audit logging (every lifecycle transition and billing change)
//! - Integration with other modules (entitlement caches, notifications)
//!
//! Events are named in past tense: `Renewed` not `Renew`.

use serde::{Deserialize, Serialize};

use super::{Subscription, SubscriptionStatus, Transition};
use crate::domain::catalog::{Feature, Tier};
use crate::domain::foundation::{ClinicId, DomainEvent, Money, SubscriptionId, Timestamp};

/// Events that occur during the subscription lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    /// Trial subscription created for a new clinic.
    Provisioned {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        tier: Tier,
        trial_ends_at: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: Trialing → Active
    Activated {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        tier: Tier,
        period_start: Timestamp,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: Active → Active (new period)
    Renewed {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        period_start: Timestamp,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: Trialing | Active → Grace
    EnteredGrace {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        grace_ends_at: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: Active | Grace → Suspended
    Suspended {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        occurred_at: Timestamp,
    },

    /// State transition: Grace | Suspended → Active
    Reactivated {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        from: SubscriptionStatus,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: any → Cancelled
    Cancelled {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        occurred_at: Timestamp,
    },

    TierChanged {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        from_tier: Tier,
        to_tier: Tier,
        has_intelligence: bool,
        occurred_at: Timestamp,
    },

    PaymentRecorded {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        amount: Money,
        gateway_payment_id: String,
        occurred_at: Timestamp,
    },

    PaymentFailed {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        amount: Money,
        reason: String,
        occurred_at: Timestamp,
    },

    /// A renewal charge hit a gateway outage and will be retried next sweep.
    RenewalDeferred {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        attempt: u32,
        occurred_at: Timestamp,
    },

    AutoPayChanged {
        subscription_id: SubscriptionId,
        clinic_id: ClinicId,
        enabled: bool,
        occurred_at: Timestamp,
    },

    /// `enabled: None` means the override was cleared.
    OverrideChanged {
        clinic_id: ClinicId,
        feature: Feature,
        enabled: Option<bool>,
        occurred_at: Timestamp,
    },
}

impl SubscriptionEvent {
    /// Event describing a committed lifecycle transition, if it changed
    /// anything.
    pub fn from_transition(
        subscription: &Subscription,
        transition: &Transition,
        occurred_at: Timestamp,
    ) -> Option<Self> {
        if !transition.changed() {
            return None;
        }

        let subscription_id = subscription.id;
        let clinic_id = subscription.clinic_id;
        use SubscriptionStatus::*;

        let event = match (transition.from, transition.to) {
            (Trialing, Active) => SubscriptionEvent::Activated {
                subscription_id,
                clinic_id,
                tier: subscription.tier,
                period_start: subscription.current_period_start,
                period_end: subscription.current_period_end,
                occurred_at,
            },
            (Active, Active) => SubscriptionEvent::Renewed {
                subscription_id,
                clinic_id,
                period_start: subscription.current_period_start,
                period_end: subscription.current_period_end,
                occurred_at,
            },
            (from @ (Grace | Suspended), Active) => SubscriptionEvent::Reactivated {
                subscription_id,
                clinic_id,
                from,
                period_end: subscription.current_period_end,
                occurred_at,
            },
            (_, Grace) => SubscriptionEvent::EnteredGrace {
                subscription_id,
                clinic_id,
                grace_ends_at: subscription.grace_deadline().unwrap_or(occurred_at),
                occurred_at,
            },
            (_, Suspended) => SubscriptionEvent::Suspended {
                subscription_id,
                clinic_id,
                occurred_at,
            },
            (_, Cancelled) => SubscriptionEvent::Cancelled {
                subscription_id,
                clinic_id,
                occurred_at,
            },
            _ => return None,
        };
        Some(event)
    }

    pub fn clinic_id(&self) -> ClinicId {
        match self {
            SubscriptionEvent::Provisioned { clinic_id, .. }
            | SubscriptionEvent::Activated { clinic_id, .. }
            | SubscriptionEvent::Renewed { clinic_id, .. }
            | SubscriptionEvent::EnteredGrace { clinic_id, .. }
            | SubscriptionEvent::Suspended { clinic_id, .. }
            | SubscriptionEvent::Reactivated { clinic_id, .. }
            | SubscriptionEvent::Cancelled { clinic_id, .. }
            | SubscriptionEvent::TierChanged { clinic_id, .. }
            | SubscriptionEvent::PaymentRecorded { clinic_id, .. }
            | SubscriptionEvent::PaymentFailed { clinic_id, .. }
            | SubscriptionEvent::RenewalDeferred { clinic_id, .. }
            | SubscriptionEvent::AutoPayChanged { clinic_id, .. }
            | SubscriptionEvent::OverrideChanged { clinic_id, .. } => *clinic_id,
        }
    }

    fn subscription_id(&self) -> Option<SubscriptionId> {
        match self {
            SubscriptionEvent::Provisioned { subscription_id, .. }
            | SubscriptionEvent::Activated { subscription_id, .. }
            | SubscriptionEvent::Renewed { subscription_id, .. }
            | SubscriptionEvent::EnteredGrace { subscription_id, .. }
            | SubscriptionEvent::Suspended { subscription_id, .. }
            | SubscriptionEvent::Reactivated { subscription_id, .. }
            | SubscriptionEvent::Cancelled { subscription_id, .. }
            | SubscriptionEvent::TierChanged { subscription_id, .. }
            | SubscriptionEvent::PaymentRecorded { subscription_id, .. }
            | SubscriptionEvent::PaymentFailed { subscription_id, .. }
            | SubscriptionEvent::RenewalDeferred { subscription_id, .. }
            | SubscriptionEvent::AutoPayChanged { subscription_id, .. } => Some(*subscription_id),
            SubscriptionEvent::OverrideChanged { .. } => None,
        }
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::Provisioned { .. } => "subscription.provisioned",
            SubscriptionEvent::Activated { .. } => "subscription.activated",
            SubscriptionEvent::Renewed { .. } => "subscription.renewed",
            SubscriptionEvent::EnteredGrace { .. } => "subscription.entered_grace",
            SubscriptionEvent::Suspended { .. } => "subscription.suspended",
            SubscriptionEvent::Reactivated { .. } => "subscription.reactivated",
            SubscriptionEvent::Cancelled { .. } => "subscription.cancelled",
            SubscriptionEvent::TierChanged { .. } => "subscription.tier_changed",
            SubscriptionEvent::PaymentRecorded { .. } => "subscription.payment_recorded",
            SubscriptionEvent::PaymentFailed { .. } => "subscription.payment_failed",
            SubscriptionEvent::RenewalDeferred { .. } => "subscription.renewal_deferred",
            SubscriptionEvent::AutoPayChanged { .. } => "subscription.auto_pay_changed",
            SubscriptionEvent::OverrideChanged { .. } => "entitlement.override_changed",
        }
    }

    /// Subscription id, or the clinic id for clinic-scoped events.
    fn aggregate_id(&self) -> String {
        match self.subscription_id() {
            Some(id) => id.to_string(),
            None => self.clinic_id().to_string(),
        }
    }

    fn aggregate_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::OverrideChanged { .. } => "Clinic",
            _ => "Subscription",
        }
    }

    fn occurred_at(&self) -> Timestamp {
        match self {
            SubscriptionEvent::Provisioned { occurred_at, .. }
            | SubscriptionEvent::Activated { occurred_at, .. }
            | SubscriptionEvent::Renewed { occurred_at, .. }
            | SubscriptionEvent::EnteredGrace { occurred_at, .. }
            | SubscriptionEvent::Suspended { occurred_at, .. }
            | SubscriptionEvent::Reactivated { occurred_at, .. }
            | SubscriptionEvent::Cancelled { occurred_at, .. }
            | SubscriptionEvent::TierChanged { occurred_at, .. }
            | SubscriptionEvent::PaymentRecorded { occurred_at, .. }
            | SubscriptionEvent::PaymentFailed { occurred_at, .. }
            | SubscriptionEvent::RenewalDeferred { occurred_at, .. }
            | SubscriptionEvent::AutoPayChanged { occurred_at, .. }
            | SubscriptionEvent::OverrideChanged { occurred_at, .. } => *occurred_at,
        }
    }
}
