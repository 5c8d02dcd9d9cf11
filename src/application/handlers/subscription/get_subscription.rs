//! GetSubscriptionHandler - Query handler for the billing UI snapshot.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::catalog::{BillingCycle, Tier};
use crate::domain::foundation::{ClinicId, Money, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionStatus};
use crate::ports::{Clock, SubscriptionRepository};

use super::load_current;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub clinic_id: ClinicId,
}

/// What the billing UI shows about a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub clinic_id: ClinicId,
    pub status: SubscriptionStatus,
    pub tier: Tier,
    pub has_intelligence: bool,
    pub billing_cycle: BillingCycle,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    /// Whole days left, rounded up. Present only in grace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_days_remaining: Option<u32>,
    pub auto_pay_enabled: bool,
    pub cancel_at_period_end: bool,
    pub has_payment_method: bool,
    pub price_at_snapshot: Option<Money>,
}

impl SubscriptionSnapshot {
    pub fn of(subscription: &Subscription, now: Timestamp) -> Self {
        Self {
            subscription_id: subscription.id,
            clinic_id: subscription.clinic_id,
            status: subscription.status(),
            tier: subscription.tier,
            has_intelligence: subscription.has_intelligence,
            billing_cycle: subscription.billing_cycle,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            grace_days_remaining: subscription.grace_days_remaining(now),
            auto_pay_enabled: subscription.auto_pay_enabled,
            cancel_at_period_end: subscription.cancel_at_period_end,
            has_payment_method: subscription.payment_method.is_some(),
            price_at_snapshot: subscription.price_at_snapshot.clone(),
        }
    }
}

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
}

impl GetSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            clock,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<SubscriptionSnapshot, SubscriptionError> {
        let subscription = load_current(self.subscriptions.as_ref(), &query.clinic_id).await?;
        Ok(SubscriptionSnapshot::of(&subscription, self.clock.now()))
    }
}
