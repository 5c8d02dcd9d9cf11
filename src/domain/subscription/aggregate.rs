//! Subscription aggregate.
//!
//! One record per clinic lifetime. The record's `tier` is the only place a
//! clinic's tier lives; entitlement checks read it directly.
//!
//! # Design Decisions
//!
//! - **Sum-typed state**: grace and suspension timestamps live inside
//!   [`LifecycleState`], never beside it
//! - **Money in minor units**: prices and payments are `Money` (paise)
//! - **Idempotent time events**: deadline-driven events are no-ops before
//!   the deadline
//! - **Optimistic concurrency**: `version` is bumped by the repository on
//!   every successful write

use serde::{Deserialize, Serialize};

use super::{
    DueAction, LifecycleEvent, LifecycleState, PaymentMethodRef, SubscriptionError,
    SubscriptionStatus, Transition,
};
use crate::domain::catalog::{BillingCycle, Tier, TierCatalog};
use crate::domain::foundation::{ClinicId, Money, StateMachine, SubscriptionId, Timestamp};

const SECS_PER_DAY: i64 = 86_400;

/// Lifecycle settings applied when a subscription is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPolicy {
    pub trial_days: u32,
    pub grace_period_days: u32,
    pub billing_cycle: BillingCycle,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            trial_days: 14,
            grace_period_days: 7,
            billing_cycle: BillingCycle::Monthly,
        }
    }
}

/// Outcome of an administrative tier change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub had_intelligence: bool,
    pub has_intelligence: bool,
}

impl TierChange {
    pub fn changed(&self) -> bool {
        self.from_tier != self.to_tier || self.had_intelligence != self.has_intelligence
    }
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - `current_period_end > current_period_start`
/// - `tier` is always a ladder tier; the add-on is `has_intelligence`
/// - a grace start exists exactly when the state is `Grace`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub clinic_id: ClinicId,
    pub state: LifecycleState,
    pub tier: Tier,
    pub has_intelligence: bool,
    pub billing_cycle: BillingCycle,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    /// Day of the month periods end on. Short months clamp to their last
    /// day without moving the anchor.
    pub billing_anchor_day: u32,
    /// Price locked in by the last payment. `None` only for custom pricing
    /// before the first payment.
    pub price_at_snapshot: Option<Money>,
    pub auto_pay_enabled: bool,
    pub cancel_at_period_end: bool,
    pub payment_method: Option<PaymentMethodRef>,
    pub grace_period_days: u32,
    /// Renewal charges deferred by gateway outages in the current period.
    pub renewal_attempts: u32,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates a trialing `Capture` subscription for a newly provisioned
    /// clinic.
    pub fn provision(
        clinic_id: ClinicId,
        policy: SubscriptionPolicy,
        catalog: &TierCatalog,
        now: Timestamp,
    ) -> Result<Self, SubscriptionError> {
        if policy.trial_days == 0 {
            return Err(SubscriptionError::validation(
                "trial_days",
                "trial must last at least one day",
            ));
        }

        let trial_end = now.plus_days(i64::from(policy.trial_days));
        Ok(Self {
            id: SubscriptionId::new(),
            clinic_id,
            state: LifecycleState::Trialing {
                manual_tier_selected: false,
            },
            tier: Tier::Capture,
            has_intelligence: false,
            billing_cycle: policy.billing_cycle,
            current_period_start: now,
            current_period_end: trial_end,
            billing_anchor_day: trial_end.day_of_month(),
            price_at_snapshot: catalog.list_price(Tier::Capture, policy.billing_cycle),
            auto_pay_enabled: false,
            cancel_at_period_end: false,
            payment_method: None,
            grace_period_days: policy.grace_period_days,
            renewal_attempts: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.state.status()
    }

    pub fn grace_started_at(&self) -> Option<Timestamp> {
        self.state.grace_started_at()
    }

    /// Moment the grace window closes, while in grace.
    pub fn grace_deadline(&self) -> Option<Timestamp> {
        self.grace_started_at()
            .map(|started| started.plus_days(i64::from(self.grace_period_days)))
    }

    /// Whole days left in grace, rounded up. `None` outside grace.
    pub fn grace_days_remaining(&self, now: Timestamp) -> Option<u32> {
        let deadline = self.grace_deadline()?;
        let secs = deadline.duration_since(&now).num_seconds();
        if secs <= 0 {
            return Some(0);
        }
        let days = (secs + SECS_PER_DAY - 1) / SECS_PER_DAY;
        Some(u32::try_from(days).unwrap_or(u32::MAX))
    }

    pub fn is_period_due(&self, now: Timestamp) -> bool {
        now >= self.current_period_end
    }

    /// Gateway idempotency key for the renewal of the current period.
    ///
    /// Concurrent sweep workers renewing the same period produce the same
    /// key, so the gateway collapses their charges into one.
    pub fn renewal_idempotency_key(&self) -> String {
        format!(
            "renewal:{}:{}",
            self.id,
            self.current_period_end.as_unix_secs()
        )
    }

    /// Which transition, if any, is due at `now`.
    pub fn due_action(&self, now: Timestamp) -> Option<DueAction> {
        let due = self.is_period_due(now);
        let can_charge = self.auto_pay_enabled && self.payment_method.is_some();

        match self.state {
            LifecycleState::Trialing {
                manual_tier_selected,
            } if due => Some(if self.cancel_at_period_end {
                DueAction::Cancel
            } else if can_charge {
                DueAction::ChargeRenewal
            } else if manual_tier_selected || self.payment_method.is_some() {
                DueAction::AwaitManualPayment
            } else {
                DueAction::ExpireTrial
            }),
            LifecycleState::Active if due => Some(if self.cancel_at_period_end {
                DueAction::Cancel
            } else if can_charge {
                DueAction::ChargeRenewal
            } else if self.auto_pay_enabled {
                DueAction::SuspendWithoutPaymentMethod
            } else {
                DueAction::EnterGrace
            }),
            LifecycleState::Grace { .. } if self.cancel_at_period_end => Some(DueAction::Cancel),
            LifecycleState::Grace { .. } => self
                .grace_deadline()
                .filter(|deadline| now >= *deadline)
                .map(|_| DueAction::EndGrace),
            _ => None,
        }
    }

    /// The lifecycle transition function.
    ///
    /// Every (state, event) pair is handled explicitly. Deadline-driven
    /// events before their deadline, and any event on a cancelled record
    /// other than a payment, return an unchanged [`Transition`].
    pub fn apply(
        &mut self,
        event: LifecycleEvent,
        now: Timestamp,
    ) -> Result<Transition, SubscriptionError> {
        use LifecycleEvent::*;

        let from = self.status();
        let due = self.is_period_due(now);

        let step = match (self.state, event) {
            (LifecycleState::Cancelled { .. }, PaymentReceived | RenewalCharged) => {
                return Err(SubscriptionError::invalid_state(from, "apply a payment to"));
            }
            (LifecycleState::Cancelled { .. }, _) => Step::Stay,
            (_, AdministrativeCancel) => Step::Enter(LifecycleState::Cancelled { at: now }),

            // Trialing
            (LifecycleState::Trialing { .. }, PaymentReceived) => Step::FreshPeriod,
            (LifecycleState::Trialing { .. }, RenewalCharged) if due => Step::RollForward,
            (LifecycleState::Trialing { .. }, RenewalFailed) if due => {
                Step::Enter(LifecycleState::Grace { started_at: now })
            }
            (LifecycleState::Trialing { .. }, TrialExpired) if due => {
                Step::Enter(LifecycleState::Cancelled { at: now })
            }
            (LifecycleState::Trialing { .. }, PeriodEnded) if due && self.cancel_at_period_end => {
                Step::Enter(LifecycleState::Cancelled { at: now })
            }
            (LifecycleState::Trialing { .. }, _) => Step::Stay,

            // Active
            (LifecycleState::Active, PaymentReceived | RenewalCharged) if due => Step::RollForward,
            (LifecycleState::Active, RenewalFailed) if due => {
                Step::Enter(LifecycleState::Grace { started_at: now })
            }
            (LifecycleState::Active, PaymentMethodMissing) if due => {
                Step::Enter(LifecycleState::Suspended { since: now })
            }
            (LifecycleState::Active, PeriodEnded) if due && self.cancel_at_period_end => {
                Step::Enter(LifecycleState::Cancelled { at: now })
            }
            (LifecycleState::Active, _) => Step::Stay,

            // Grace
            (LifecycleState::Grace { .. }, PaymentReceived | RenewalCharged) => Step::RollForward,
            (LifecycleState::Grace { started_at }, GraceElapsed)
                if now >= started_at.plus_days(i64::from(self.grace_period_days)) =>
            {
                Step::Enter(LifecycleState::Suspended { since: now })
            }
            (LifecycleState::Grace { .. }, PeriodEnded) if self.cancel_at_period_end => {
                Step::Enter(LifecycleState::Cancelled { at: now })
            }
            (LifecycleState::Grace { .. }, _) => Step::Stay,

            // Suspended
            (LifecycleState::Suspended { .. }, PaymentReceived | RenewalCharged) => {
                Step::FreshPeriod
            }
            (LifecycleState::Suspended { .. }, _) => Step::Stay,
        };

        self.perform(from, step, now)
    }

    fn perform(
        &mut self,
        from: SubscriptionStatus,
        step: Step,
        now: Timestamp,
    ) -> Result<Transition, SubscriptionError> {
        let (next_state, period) = match step {
            Step::Stay => return Ok(Transition::unchanged(from)),
            Step::Enter(state) => (state, None),
            Step::RollForward => {
                let start = self.current_period_end;
                let end = self.billing_cycle.advance_anchored(start, self.billing_anchor_day);
                (LifecycleState::Active, Some((start, end)))
            }
            Step::FreshPeriod => {
                self.billing_anchor_day = now.day_of_month();
                (
                    LifecycleState::Active,
                    Some((now, self.billing_cycle.advance(now))),
                )
            }
        };

        let to = next_state.status();
        from.transition_to(to)
            .map_err(|_| SubscriptionError::invalid_state(from, format!("move to {}", to)))?;

        self.state = next_state;
        if let Some((start, end)) = period {
            self.current_period_start = start;
            self.current_period_end = end;
        }
        if to == SubscriptionStatus::Cancelled {
            self.auto_pay_enabled = false;
        }
        self.renewal_attempts = 0;
        self.updated_at = now;

        Ok(Transition {
            from,
            to,
            period_advanced: period.is_some(),
        })
    }

    /// Applies a recorded `paid` payment: sets the tier, drives the
    /// lifecycle, and snapshots the price.
    ///
    /// `Intelligence` turns the add-on on and keeps the ladder tier. Custom
    /// priced tiers snapshot the amount actually paid.
    pub fn apply_payment(
        &mut self,
        new_tier: Tier,
        amount: &Money,
        catalog: &TierCatalog,
        now: Timestamp,
    ) -> Result<Transition, SubscriptionError> {
        if self.status() == SubscriptionStatus::Cancelled {
            return Err(SubscriptionError::invalid_state(
                self.status(),
                "apply a payment to",
            ));
        }

        self.select_tier(new_tier);
        let transition = self.apply(LifecycleEvent::PaymentReceived, now)?;

        self.price_at_snapshot = catalog
            .list_price(self.tier, self.billing_cycle)
            .or_else(|| Some(amount.clone()));
        self.renewal_attempts = 0;
        self.updated_at = now;
        Ok(transition)
    }

    /// Administrative tier change without payment. Status and period are
    /// untouched.
    pub fn change_tier(&mut self, new_tier: Tier, now: Timestamp) -> Result<TierChange, SubscriptionError> {
        self.ensure_not_cancelled("change the tier of")?;
        let change = self.select_tier(new_tier);
        if change.changed() {
            self.updated_at = now;
        }
        Ok(change)
    }

    /// Drops the Intelligence add-on.
    pub fn remove_addon(&mut self, now: Timestamp) -> Result<TierChange, SubscriptionError> {
        self.ensure_not_cancelled("change the tier of")?;
        let change = TierChange {
            from_tier: self.tier,
            to_tier: self.tier,
            had_intelligence: self.has_intelligence,
            has_intelligence: false,
        };
        if change.changed() {
            self.has_intelligence = false;
            self.updated_at = now;
        }
        Ok(change)
    }

    fn select_tier(&mut self, new_tier: Tier) -> TierChange {
        let from_tier = self.tier;
        let had_intelligence = self.has_intelligence;

        if new_tier.is_addon() {
            self.has_intelligence = true;
        } else {
            self.tier = new_tier;
        }
        if let LifecycleState::Trialing {
            manual_tier_selected,
        } = &mut self.state
        {
            *manual_tier_selected = true;
        }

        TierChange {
            from_tier,
            to_tier: self.tier,
            had_intelligence,
            has_intelligence: self.has_intelligence,
        }
    }

    /// Saves a chargeable payment method.
    pub fn attach_payment_method(
        &mut self,
        method: PaymentMethodRef,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        self.ensure_not_cancelled("attach a payment method to")?;
        self.payment_method = Some(method);
        self.updated_at = now;
        Ok(())
    }

    /// Turns auto-pay on or off. Enabling requires a saved payment method.
    ///
    /// Returns whether the flag changed.
    pub fn set_auto_pay(&mut self, enabled: bool, now: Timestamp) -> Result<bool, SubscriptionError> {
        self.ensure_not_cancelled("change auto-pay on")?;
        if enabled && self.payment_method.is_none() {
            return Err(SubscriptionError::no_payment_method(self.id));
        }
        if self.auto_pay_enabled == enabled {
            return Ok(false);
        }
        self.auto_pay_enabled = enabled;
        self.updated_at = now;
        Ok(true)
    }

    /// Schedules cancellation for the end of the current period.
    pub fn request_cancellation(&mut self, now: Timestamp) -> Result<bool, SubscriptionError> {
        self.ensure_not_cancelled("cancel")?;
        let changed = !self.cancel_at_period_end;
        self.cancel_at_period_end = true;
        self.updated_at = now;
        Ok(changed)
    }

    /// Withdraws a scheduled cancellation.
    pub fn resume(&mut self, now: Timestamp) -> Result<bool, SubscriptionError> {
        self.ensure_not_cancelled("resume")?;
        let changed = self.cancel_at_period_end;
        self.cancel_at_period_end = false;
        self.updated_at = now;
        Ok(changed)
    }

    /// Counts a renewal charge deferred by a gateway outage.
    pub fn record_deferred_renewal(&mut self, now: Timestamp) -> u32 {
        self.renewal_attempts = self.renewal_attempts.saturating_add(1);
        self.updated_at = now;
        self.renewal_attempts
    }

    /// Amount to charge for the next period: the tier's current list price
    /// (or the snapshot for custom pricing) plus the add-on.
    pub fn renewal_charge(&self, catalog: &TierCatalog) -> Option<Money> {
        let base = catalog
            .list_price(self.tier, self.billing_cycle)
            .or_else(|| self.price_at_snapshot.clone())?;
        if !self.has_intelligence {
            return Some(base);
        }
        let addon = catalog.list_price(Tier::Intelligence, self.billing_cycle)?;
        Money::new(base.amount_minor() + addon.amount_minor(), base.currency()).ok()
    }

    fn ensure_not_cancelled(&self, attempted: &str) -> Result<(), SubscriptionError> {
        match self.status() {
            SubscriptionStatus::Cancelled => Err(SubscriptionError::invalid_state(
                SubscriptionStatus::Cancelled,
                attempted,
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Stay,
    Enter(LifecycleState),
    /// Active, next period starts at the old period end.
    RollForward,
    /// Active, next period starts now.
    FreshPeriod,
}
