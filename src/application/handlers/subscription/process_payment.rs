//! ProcessPaymentHandler - Applies a settled payment to a subscription.
//!
//! Admin-entered payments and gateway webhooks share this path and key off
//! the gateway payment id, so a payment seen twice is applied once.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::catalog::Catalog;
use crate::domain::foundation::{ClinicId, ErrorCode, Money, SubscriptionId};
use crate::domain::subscription::{
    GatewayPaymentId, PaymentRecord, Subscription, SubscriptionError, SubscriptionEvent,
    Transition,
};
use crate::ports::{
    Clock, EventPublisher, PaymentLedger, SubscriptionChange, SubscriptionRepository, UsageReader,
};

use super::{ensure_within_limits, is_downgrade, load_current, publish_events, CONFLICT_ATTEMPTS};

/// Which subscription a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Subscription(SubscriptionId),
    /// The clinic's current record.
    Clinic(ClinicId),
}

/// Command to apply a payment.
#[derive(Debug, Clone)]
pub struct ProcessPaymentCommand {
    pub target: SubscriptionTarget,
    pub amount_minor: i64,
    pub currency: String,
    /// Tier name as entered, validated against the catalog.
    pub new_tier: String,
    /// How the payment was made, e.g. `razorpay`, `upi`, `cash`.
    pub payment_method: String,
    pub gateway_payment_id: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Applied,
    /// The gateway payment id was already applied; nothing changed.
    AlreadyApplied,
}

#[derive(Debug, Clone)]
pub struct ProcessPaymentResult {
    pub subscription: Subscription,
    pub payment: PaymentRecord,
    pub outcome: PaymentOutcome,
    /// `None` when the payment was already applied.
    pub transition: Option<Transition>,
}

/// Handler for the payment / tier-change processor.
///
/// The ledger insert, tier update, lifecycle transition and price snapshot
/// commit as one unit. A payment for a lower tier is held to the same usage
/// limits as an administrative downgrade.
pub struct ProcessPaymentHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn PaymentLedger>,
    usage: Arc<dyn UsageReader>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    catalog: Arc<Catalog>,
}

impl ProcessPaymentHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn PaymentLedger>,
        usage: Arc<dyn UsageReader>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
            usage,
            event_publisher,
            clock,
            catalog,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessPaymentCommand,
    ) -> Result<ProcessPaymentResult, SubscriptionError> {
        // 1. Validate input before touching state
        let amount = Money::new(cmd.amount_minor, &cmd.currency)?;
        let gateway_payment_id = GatewayPaymentId::new(&cmd.gateway_payment_id)?;
        let new_tier = self
            .catalog
            .tiers
            .lookup(&cmd.new_tier)
            .map(|definition| definition.tier)
            .map_err(|_| SubscriptionError::invalid_tier(&cmd.new_tier))?;
        if cmd.payment_method.trim().is_empty() {
            return Err(SubscriptionError::validation(
                "payment_method",
                "payment method is required",
            ));
        }

        // 2. Idempotency: a known gateway id returns the prior result
        if let Some(prior) = self.already_applied(&gateway_payment_id).await? {
            return Ok(prior);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let mut subscription = self.load(cmd.target).await?;
            let expected_version = subscription.version;
            let from_tier = subscription.tier;
            let had_intelligence = subscription.has_intelligence;

            if is_downgrade(from_tier, new_tier) {
                let usage = self.usage.usage_for(&subscription.clinic_id).await?;
                ensure_within_limits(new_tier, &self.catalog.tiers.get(new_tier).limits, &usage)?;
            }

            // 3. Tier, lifecycle and snapshot on the in-memory aggregate
            let transition = subscription.apply_payment(new_tier, &amount, &self.catalog.tiers, now)?;
            let payment = PaymentRecord::paid(
                subscription.id,
                amount.clone(),
                gateway_payment_id.clone(),
                cmd.payment_method.trim(),
                cmd.notes.clone(),
                now,
            );

            // 4. Ledger entry and subscription commit together
            let change = SubscriptionChange::new(subscription.clone(), expected_version)
                .with_payment(payment.clone());
            match self.subscriptions.commit(change).await {
                Ok(version) => {
                    subscription.version = version;
                }
                Err(err) if err.code == ErrorCode::DuplicatePayment => {
                    // Lost the race to a concurrent delivery of the same payment
                    return match self.already_applied(&gateway_payment_id).await? {
                        Some(prior) => Ok(prior),
                        None => Err(err.into()),
                    };
                }
                Err(err) if err.is_conflict() && attempt < CONFLICT_ATTEMPTS => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        gateway_payment_id = %gateway_payment_id,
                        attempt,
                        "version conflict while applying payment, retrying"
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            tracing::info!(
                subscription_id = %subscription.id,
                clinic_id = %subscription.clinic_id,
                gateway_payment_id = %gateway_payment_id,
                amount = %amount,
                from = %transition.from,
                to = %transition.to,
                tier = %subscription.tier,
                "payment applied"
            );

            let mut events = vec![SubscriptionEvent::PaymentRecorded {
                subscription_id: subscription.id,
                clinic_id: subscription.clinic_id,
                amount: amount.clone(),
                gateway_payment_id: gateway_payment_id.to_string(),
                occurred_at: now,
            }];
            if from_tier != subscription.tier || had_intelligence != subscription.has_intelligence {
                events.push(SubscriptionEvent::TierChanged {
                    subscription_id: subscription.id,
                    clinic_id: subscription.clinic_id,
                    from_tier,
                    to_tier: subscription.tier,
                    has_intelligence: subscription.has_intelligence,
                    occurred_at: now,
                });
            }
            events.extend(SubscriptionEvent::from_transition(&subscription, &transition, now));
            publish_events(self.event_publisher.as_ref(), events).await;

            return Ok(ProcessPaymentResult {
                subscription,
                payment,
                outcome: PaymentOutcome::Applied,
                transition: Some(transition),
            });
        }
    }

    async fn load(&self, target: SubscriptionTarget) -> Result<Subscription, SubscriptionError> {
        match target {
            SubscriptionTarget::Subscription(id) => self
                .subscriptions
                .find_by_id(&id)
                .await?
                .ok_or_else(|| SubscriptionError::not_found(id)),
            SubscriptionTarget::Clinic(clinic_id) => {
                load_current(self.subscriptions.as_ref(), &clinic_id).await
            }
        }
    }

    /// The stored payment and the subscription as it stands now. Changes made
    /// after the original application (a later renewal, a tier change) show
    /// up in the returned record.
    async fn already_applied(
        &self,
        gateway_payment_id: &GatewayPaymentId,
    ) -> Result<Option<ProcessPaymentResult>, SubscriptionError> {
        let Some(payment) = self.ledger.find_paid_by_gateway_id(gateway_payment_id).await? else {
            return Ok(None);
        };
        let subscription = self
            .subscriptions
            .find_by_id(&payment.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(payment.subscription_id))?;

        tracing::info!(
            subscription_id = %subscription.id,
            gateway_payment_id = %gateway_payment_id,
            "payment already applied, returning prior result"
        );

        Ok(Some(ProcessPaymentResult {
            subscription,
            payment,
            outcome: PaymentOutcome::AlreadyApplied,
            transition: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::test_support::Fixture;
    use crate::domain::catalog::{LimitedResource, TenantUsage, Tier};
    use crate::domain::subscription::{LifecycleEvent, LifecycleState, SubscriptionStatus};
    use crate::ports::PaymentLedger;

    fn handler(fx: &Fixture) -> ProcessPaymentHandler {
        ProcessPaymentHandler::new(
            fx.store.clone(),
            fx.store.clone(),
            fx.usage.clone(),
            fx.bus.clone(),
            fx.clock.clone(),
            fx.catalog.clone(),
        )
    }

    fn command(sub: &Subscription, tier: &str, gateway_id: &str) -> ProcessPaymentCommand {
        ProcessPaymentCommand {
            target: SubscriptionTarget::Subscription(sub.id),
            amount_minor: 249_900,
            currency: "INR".to_string(),
            new_tier: tier.to_string(),
            payment_method: "razorpay".to_string(),
            gateway_payment_id: gateway_id.to_string(),
            notes: None,
        }
    }

    async fn grace_core(fx: &Fixture) -> Subscription {
        fx.seed(|s| {
            s.tier = Tier::Core;
            s.state = LifecycleState::Grace {
                started_at: Fixture::start(),
            };
        })
        .await
    }

    #[tokio::test]
    async fn grace_payment_activates_and_upgrades() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        fx.clock.advance_days(2);

        let result = handler(&fx).handle(command(&sub, "PLUS", "pay_123")).await.unwrap();

        assert_eq!(result.outcome, PaymentOutcome::Applied);
        assert_eq!(result.subscription.status(), SubscriptionStatus::Active);
        assert_eq!(result.subscription.tier, Tier::Plus);

        let payments = fx.store.list_for_subscription(&sub.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].is_paid());
        assert_eq!(payments[0].amount.amount_minor(), 249_900);

        assert!(fx.bus.has_event("subscription.payment_recorded"));
        assert!(fx.bus.has_event("subscription.tier_changed"));
        assert!(fx.bus.has_event("subscription.reactivated"));
    }

    #[tokio::test]
    async fn same_gateway_id_twice_applies_once_and_returns_same_record() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        let handler = handler(&fx);

        let first = handler.handle(command(&sub, "PLUS", "pay_123")).await.unwrap();
        fx.clock.advance_secs(60);
        let second = handler.handle(command(&sub, "PLUS", "pay_123")).await.unwrap();

        assert_eq!(second.outcome, PaymentOutcome::AlreadyApplied);
        assert_eq!(first.subscription, second.subscription);
        assert_eq!(first.payment.id, second.payment.id);
        assert_eq!(fx.store.all_payments().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tier_is_rejected_without_side_effects() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;

        let err = handler(&fx)
            .handle(command(&sub, "PLATINUM", "pay_1"))
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::invalid_tier("PLATINUM"));
        assert!(fx.store.all_payments().await.is_empty());
        assert_eq!(fx.reload(&sub).await, sub);
    }

    #[tokio::test]
    async fn negative_amount_is_a_validation_error() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        let mut cmd = command(&sub, "PLUS", "pay_1");
        cmd.amount_minor = -1;

        assert!(matches!(
            handler(&fx).handle(cmd).await,
            Err(SubscriptionError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn missing_subscription_is_not_found() {
        let fx = Fixture::new();
        let id = SubscriptionId::new();
        let mut cmd = command(&fx.seed(|_| {}).await, "CORE", "pay_1");
        cmd.target = SubscriptionTarget::Subscription(id);

        assert_eq!(
            handler(&fx).handle(cmd).await.unwrap_err(),
            SubscriptionError::not_found(id)
        );
    }

    #[tokio::test]
    async fn cancelled_subscription_rejects_payment() {
        let fx = Fixture::new();
        let sub = fx
            .seed(|s| {
                s.apply(LifecycleEvent::AdministrativeCancel, Fixture::start())
                    .unwrap();
            })
            .await;

        assert!(matches!(
            handler(&fx).handle(command(&sub, "CORE", "pay_1")).await,
            Err(SubscriptionError::InvalidState { .. })
        ));
        assert!(fx.store.all_payments().await.is_empty());
    }

    #[tokio::test]
    async fn transient_conflicts_are_retried_transparently() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        fx.store.inject_conflicts(2).await;

        let result = handler(&fx).handle(command(&sub, "PLUS", "pay_9")).await.unwrap();

        assert_eq!(result.subscription.version, 1);
        assert_eq!(fx.store.all_payments().await.len(), 1);
    }

    #[tokio::test]
    async fn persistent_conflicts_surface_as_conflict() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        fx.store.inject_conflicts(CONFLICT_ATTEMPTS).await;

        let err = handler(&fx).handle(command(&sub, "PLUS", "pay_9")).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Conflict(_)));
        assert!(fx.store.all_payments().await.is_empty());
    }

    #[tokio::test]
    async fn clinic_target_uses_current_record() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        let mut cmd = command(&sub, "CORE", "pay_5");
        cmd.target = SubscriptionTarget::Clinic(sub.clinic_id);

        let result = handler(&fx).handle(cmd).await.unwrap();
        assert_eq!(result.subscription.id, sub.id);
    }

    async fn active_plus_with_patients(fx: &Fixture, patients: u32) -> Subscription {
        let sub = fx
            .seed(|s| {
                s.tier = Tier::Plus;
                s.state = LifecycleState::Active;
            })
            .await;
        fx.usage
            .set_usage(
                sub.clinic_id,
                TenantUsage {
                    patients,
                    ..TenantUsage::default()
                },
            )
            .await;
        sub
    }

    #[tokio::test]
    async fn payment_for_lower_tier_over_limits_is_blocked() {
        let fx = Fixture::new();
        let sub = active_plus_with_patients(&fx, 600).await;

        let err = handler(&fx)
            .handle(command(&sub, "CORE", "pay_down"))
            .await
            .unwrap_err();

        match err {
            SubscriptionError::DowngradeBlocked { target, breaches } => {
                assert_eq!(target, Tier::Core);
                assert_eq!(breaches[0].resource, LimitedResource::Patients);
            }
            other => panic!("expected DowngradeBlocked, got {:?}", other),
        }
        assert!(fx.store.all_payments().await.is_empty());
        assert_eq!(fx.reload(&sub).await.tier, Tier::Plus);
    }

    #[tokio::test]
    async fn payment_for_lower_tier_within_limits_applies() {
        let fx = Fixture::new();
        let sub = active_plus_with_patients(&fx, 120).await;

        let result = handler(&fx)
            .handle(command(&sub, "CORE", "pay_down"))
            .await
            .unwrap();

        assert_eq!(result.outcome, PaymentOutcome::Applied);
        assert_eq!(result.subscription.tier, Tier::Core);
    }

    #[tokio::test]
    async fn duplicate_found_at_commit_returns_prior_result() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        let first = handler(&fx).handle(command(&sub, "PLUS", "pay_race")).await.unwrap();

        // The second delivery's idempotency read races the first commit.
        let handler = ProcessPaymentHandler::new(
            fx.store.clone(),
            Arc::new(FirstLookupMisses::new(fx.store.clone())),
            fx.usage.clone(),
            fx.bus.clone(),
            fx.clock.clone(),
            fx.catalog.clone(),
        );
        let second = handler.handle(command(&sub, "PLUS", "pay_race")).await.unwrap();

        assert_eq!(second.outcome, PaymentOutcome::AlreadyApplied);
        assert_eq!(second.payment.id, first.payment.id);
        assert_eq!(fx.store.all_payments().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_after_conflict_retry_returns_prior_result() {
        let fx = Fixture::new();
        let sub = grace_core(&fx).await;
        handler(&fx).handle(command(&sub, "PLUS", "pay_race")).await.unwrap();
        fx.store.inject_conflicts(1).await;

        let handler = ProcessPaymentHandler::new(
            fx.store.clone(),
            Arc::new(FirstLookupMisses::new(fx.store.clone())),
            fx.usage.clone(),
            fx.bus.clone(),
            fx.clock.clone(),
            fx.catalog.clone(),
        );
        let result = handler.handle(command(&sub, "PLUS", "pay_race")).await.unwrap();

        assert_eq!(result.outcome, PaymentOutcome::AlreadyApplied);
        assert_eq!(fx.store.all_payments().await.len(), 1);
    }

    /// Ledger whose first idempotency lookup sees nothing, as when a
    /// concurrent delivery commits right after it.
    struct FirstLookupMisses {
        inner: Arc<crate::adapters::memory::InMemorySubscriptionStore>,
        missed: std::sync::atomic::AtomicBool,
    }

    impl FirstLookupMisses {
        fn new(inner: Arc<crate::adapters::memory::InMemorySubscriptionStore>) -> Self {
            Self {
                inner,
                missed: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl PaymentLedger for FirstLookupMisses {
        async fn find_paid_by_gateway_id(
            &self,
            gateway_payment_id: &GatewayPaymentId,
        ) -> Result<Option<PaymentRecord>, crate::domain::foundation::DomainError> {
            if !self.missed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_paid_by_gateway_id(gateway_payment_id).await
        }

        async fn list_for_subscription(
            &self,
            subscription_id: &SubscriptionId,
        ) -> Result<Vec<PaymentRecord>, crate::domain::foundation::DomainError> {
            self.inner.list_for_subscription(subscription_id).await
        }

        async fn append(
            &self,
            payment: &PaymentRecord,
        ) -> Result<(), crate::domain::foundation::DomainError> {
            self.inner.append(payment).await
        }
    }
}
