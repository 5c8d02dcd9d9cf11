//! Subscription handlers.
//!
//! Command and query handlers for the subscription lifecycle:
//!
//! ## Commands
//! - Provisioning a trial for a new clinic
//! - Processing payments (admin and gateway webhook)
//! - Administrative tier changes
//! - Payment method, auto-pay and cancellation settings
//! - Advancing due subscriptions (used by the sweep)
//! - Deactivating a clinic
//!
//! ## Queries
//! - Subscription snapshot for the billing UI
//! - Payment history

mod advance_lifecycle;
mod attach_payment_method;
mod cancel_subscription;
mod change_tier;
mod deactivate_clinic;
mod get_subscription;
mod handle_gateway_webhook;
mod list_payments;
mod process_payment;
mod provision_subscription;
mod set_auto_pay;

// Commands
pub use advance_lifecycle::{
    AdvanceLifecycleCommand, AdvanceLifecycleHandler, LifecycleOutcome, RenewalSettings,
};
pub use attach_payment_method::{AttachPaymentMethodCommand, AttachPaymentMethodHandler};
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ResumeSubscriptionCommand,
    ResumeSubscriptionHandler,
};
pub use change_tier::{ChangeTierCommand, ChangeTierHandler, ChangeTierResult};
pub use deactivate_clinic::{DeactivateClinicCommand, DeactivateClinicHandler};
pub use handle_gateway_webhook::{
    GatewayWebhookEvent, HandleGatewayWebhookHandler, WebhookOutcome,
};
pub use process_payment::{
    PaymentOutcome, ProcessPaymentCommand, ProcessPaymentHandler, ProcessPaymentResult,
    SubscriptionTarget,
};
pub use provision_subscription::{ProvisionSubscriptionCommand, ProvisionSubscriptionHandler};
pub use set_auto_pay::{SetAutoPayCommand, SetAutoPayHandler};

// Queries
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionSnapshot};
pub use list_payments::{ListPaymentsHandler, ListPaymentsQuery};

use std::cmp::Ordering;

use crate::domain::catalog::{TenantUsage, Tier, TierLimits};
use crate::domain::foundation::{ClinicId, EventEnvelope};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionEvent};
use crate::ports::{EventPublisher, SubscriptionChange, SubscriptionRepository, UsageReader};

/// Attempts for a read-modify-write that keeps losing the version race.
pub(crate) const CONFLICT_ATTEMPTS: u32 = 3;

/// The clinic's most recent subscription record.
pub(crate) async fn load_current(
    subscriptions: &dyn SubscriptionRepository,
    clinic_id: &ClinicId,
) -> Result<Subscription, SubscriptionError> {
    subscriptions
        .find_current_for_clinic(clinic_id)
        .await?
        .ok_or_else(|| SubscriptionError::not_found_for_clinic(*clinic_id))
}

/// True when moving from `current` to `target` lowers the ladder tier.
/// The add-on never counts as a downgrade.
pub(crate) fn is_downgrade(current: Tier, target: Tier) -> bool {
    matches!(target.compare(&current), Ok(Ordering::Less))
}

/// Refuses a downgrade while usage exceeds the target tier's limits.
pub(crate) fn ensure_within_limits(
    target: Tier,
    limits: &TierLimits,
    usage: &TenantUsage,
) -> Result<(), SubscriptionError> {
    let breaches = limits.breaches(usage);
    if breaches.is_empty() {
        Ok(())
    } else {
        Err(SubscriptionError::downgrade_blocked(target, breaches))
    }
}

/// Usage for `clinic_id`, read only when `target` is a ladder tier.
pub(crate) async fn usage_for_target(
    usage: &dyn UsageReader,
    clinic_id: &ClinicId,
    target: Tier,
) -> Result<Option<TenantUsage>, SubscriptionError> {
    if target.is_addon() {
        return Ok(None);
    }
    Ok(Some(usage.usage_for(clinic_id).await?))
}

/// Loads the clinic's subscription, applies `mutate` and commits, retrying
/// on version conflicts with a fresh read each time.
pub(crate) async fn update_current<T, F>(
    subscriptions: &dyn SubscriptionRepository,
    clinic_id: &ClinicId,
    mut mutate: F,
) -> Result<(Subscription, T), SubscriptionError>
where
    F: FnMut(&mut Subscription) -> Result<T, SubscriptionError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut subscription = load_current(subscriptions, clinic_id).await?;
        let expected_version = subscription.version;
        let outcome = mutate(&mut subscription)?;

        match subscriptions
            .commit(SubscriptionChange::new(subscription.clone(), expected_version))
            .await
        {
            Ok(version) => {
                subscription.version = version;
                return Ok((subscription, outcome));
            }
            Err(err) if err.is_conflict() && attempt < CONFLICT_ATTEMPTS => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    clinic_id = %clinic_id,
                    attempt,
                    "version conflict, re-reading subscription"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Publishes committed events. Failures are logged; the commit stands.
pub(crate) async fn publish_events(publisher: &dyn EventPublisher, events: Vec<SubscriptionEvent>) {
    if events.is_empty() {
        return;
    }

    let mut envelopes = Vec::with_capacity(events.len());
    for event in &events {
        match EventEnvelope::from_event(event) {
            Ok(envelope) => envelopes.push(envelope),
            Err(err) => tracing::warn!(error = %err, "failed to serialize domain event"),
        }
    }

    if let Err(err) = publisher.publish_all(envelopes).await {
        tracing::warn!(error = %err, count = events.len(), "failed to publish domain events");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::adapters::clock::FixedClock;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::{
        InMemoryOverrideStore, InMemorySubscriptionStore, InMemoryUsageReader,
    };
    use crate::adapters::razorpay::MockPaymentGateway;
    use crate::domain::catalog::Catalog;
    use crate::domain::foundation::{ClinicId, Timestamp};
    use crate::domain::subscription::{Subscription, SubscriptionPolicy};
    use crate::ports::SubscriptionRepository;

    pub struct Fixture {
        pub store: Arc<InMemorySubscriptionStore>,
        pub overrides: Arc<InMemoryOverrideStore>,
        pub usage: Arc<InMemoryUsageReader>,
        pub gateway: Arc<MockPaymentGateway>,
        pub bus: Arc<InMemoryEventBus>,
        pub clock: Arc<FixedClock>,
        pub catalog: Arc<Catalog>,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                store: Arc::new(InMemorySubscriptionStore::new()),
                overrides: Arc::new(InMemoryOverrideStore::new()),
                usage: Arc::new(InMemoryUsageReader::new()),
                gateway: Arc::new(MockPaymentGateway::new()),
                bus: Arc::new(InMemoryEventBus::new()),
                clock: Arc::new(FixedClock::new(Self::start())),
                catalog: Arc::new(Catalog::standard()),
            }
        }

        pub fn start() -> Timestamp {
            Timestamp::from_datetime(Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap())
        }

        /// Stores a trialing subscription and lets `shape` adjust it first.
        pub async fn seed(&self, shape: impl FnOnce(&mut Subscription)) -> Subscription {
            let mut sub = Subscription::provision(
                ClinicId::new(),
                SubscriptionPolicy::default(),
                &self.catalog.tiers,
                Self::start(),
            )
            .unwrap();
            shape(&mut sub);
            self.store.insert(&sub).await.unwrap();
            sub
        }

        pub async fn reload(&self, sub: &Subscription) -> Subscription {
            self.store.find_by_id(&sub.id).await.unwrap().unwrap()
        }
    }
}
