//! End-to-end subscription lifecycle over the in-memory adapters.
//!
//! Drives one clinic through trial, manual payment, auto-renewal, a
//! declined renewal, suspension and reactivation, with the sweeper doing
//! the time-driven work and a fixed clock standing in for the calendar.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use clinic_billing::adapters::clock::FixedClock;
use clinic_billing::adapters::events::InMemoryEventBus;
use clinic_billing::adapters::memory::{
    InMemoryOverrideStore, InMemorySubscriptionStore, InMemoryUsageReader,
};
use clinic_billing::adapters::razorpay::MockPaymentGateway;
use clinic_billing::adapters::scheduler::{LifecycleSweeper, SweeperConfig};
use clinic_billing::application::handlers::entitlement::{
    CheckFeatureAccessHandler, CheckFeatureAccessQuery, SetFeatureOverrideCommand,
    SetFeatureOverrideHandler,
};
use clinic_billing::application::handlers::subscription::{
    AdvanceLifecycleHandler, AttachPaymentMethodCommand, AttachPaymentMethodHandler,
    ChangeTierCommand, ChangeTierHandler, DeactivateClinicCommand, DeactivateClinicHandler,
    GetSubscriptionHandler, GetSubscriptionQuery, ListPaymentsHandler, ListPaymentsQuery,
    PaymentOutcome, ProcessPaymentCommand, ProcessPaymentHandler, ProvisionSubscriptionCommand,
    ProvisionSubscriptionHandler, RenewalSettings, SetAutoPayCommand, SetAutoPayHandler,
    SubscriptionSnapshot, SubscriptionTarget,
};
use clinic_billing::application::RetryPolicy;
use clinic_billing::domain::catalog::{Catalog, Feature, TenantUsage, Tier};
use clinic_billing::domain::entitlement::AccessDecision;
use clinic_billing::domain::foundation::{ClinicId, Timestamp};
use clinic_billing::domain::subscription::{
    PaymentStatus, SubscriptionError, SubscriptionPolicy, SubscriptionStatus,
};
use clinic_billing::ports::{Clock, GatewayError};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Harness {
    store: Arc<InMemorySubscriptionStore>,
    overrides: Arc<InMemoryOverrideStore>,
    usage: Arc<InMemoryUsageReader>,
    gateway: Arc<MockPaymentGateway>,
    bus: Arc<InMemoryEventBus>,
    clock: Arc<FixedClock>,
    catalog: Arc<Catalog>,
    sweeper: LifecycleSweeper,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(FixedClock::new(start()));
        let catalog = Arc::new(Catalog::standard());

        let advance = AdvanceLifecycleHandler::new(
            store.clone(),
            gateway.clone(),
            bus.clone(),
            clock.clone(),
            catalog.clone(),
            RenewalSettings {
                retry: RetryPolicy::immediate(2),
                charge_timeout: Duration::from_millis(100),
                max_renewal_attempts: 3,
            },
        );
        let sweeper = LifecycleSweeper::new(
            store.clone(),
            Arc::new(advance),
            clock.clone(),
            SweeperConfig::default(),
        );

        Self {
            store,
            overrides: Arc::new(InMemoryOverrideStore::new()),
            usage: Arc::new(InMemoryUsageReader::new()),
            gateway,
            bus,
            clock,
            catalog,
            sweeper,
        }
    }

    async fn provision(&self, clinic_id: ClinicId) -> Result<(), SubscriptionError> {
        ProvisionSubscriptionHandler::new(
            self.store.clone(),
            self.bus.clone(),
            self.clock.clone(),
            self.catalog.clone(),
            SubscriptionPolicy::default(),
        )
        .handle(ProvisionSubscriptionCommand { clinic_id })
        .await
        .map(|_| ())
    }

    async fn snapshot(&self, clinic_id: ClinicId) -> SubscriptionSnapshot {
        GetSubscriptionHandler::new(self.store.clone(), self.clock.clone())
            .handle(GetSubscriptionQuery { clinic_id })
            .await
            .unwrap()
    }

    async fn change_tier(&self, clinic_id: ClinicId, tier: &str) -> Result<(), SubscriptionError> {
        ChangeTierHandler::new(
            self.store.clone(),
            self.usage.clone(),
            self.bus.clone(),
            self.clock.clone(),
            self.catalog.clone(),
        )
        .handle(ChangeTierCommand {
            clinic_id,
            new_tier: tier.to_string(),
            drop_intelligence: false,
        })
        .await
        .map(|_| ())
    }

    async fn pay(&self, clinic_id: ClinicId, tier: &str, reference: &str) -> PaymentOutcome {
        ProcessPaymentHandler::new(
            self.store.clone(),
            self.store.clone(),
            self.usage.clone(),
            self.bus.clone(),
            self.clock.clone(),
            self.catalog.clone(),
        )
        .handle(ProcessPaymentCommand {
            target: SubscriptionTarget::Clinic(clinic_id),
            amount_minor: 249_900,
            currency: "INR".to_string(),
            new_tier: tier.to_string(),
            payment_method: "upi".to_string(),
            gateway_payment_id: reference.to_string(),
            notes: None,
        })
        .await
        .unwrap()
        .outcome
    }

    async fn enable_auto_pay(&self, clinic_id: ClinicId) {
        AttachPaymentMethodHandler::new(self.store.clone(), self.clock.clone())
            .handle(AttachPaymentMethodCommand {
                clinic_id,
                token: "token_clinic_card".to_string(),
            })
            .await
            .unwrap();
        SetAutoPayHandler::new(self.store.clone(), self.bus.clone(), self.clock.clone())
            .handle(SetAutoPayCommand {
                clinic_id,
                enabled: true,
            })
            .await
            .unwrap();
    }

    async fn allowed(&self, clinic_id: ClinicId, feature: Feature) -> bool {
        CheckFeatureAccessHandler::new(
            self.store.clone(),
            self.overrides.clone(),
            self.catalog.clone(),
        )
        .handle(CheckFeatureAccessQuery { clinic_id, feature })
        .await
        .unwrap()
        .is_allowed()
    }

    async fn payment_statuses(&self, clinic_id: ClinicId) -> Vec<PaymentStatus> {
        ListPaymentsHandler::new(self.store.clone(), self.store.clone())
            .handle(ListPaymentsQuery { clinic_id })
            .await
            .unwrap()
            .into_iter()
            .map(|payment| payment.status)
            .collect()
    }
}

fn start() -> Timestamp {
    Timestamp::from_datetime(Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap())
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn clinic_moves_through_the_whole_lifecycle() {
    let h = Harness::new();
    let clinic_id = ClinicId::new();

    // Trial on the entry tier, then a manual pick of Plus.
    h.provision(clinic_id).await.unwrap();
    assert_eq!(h.snapshot(clinic_id).await.status, SubscriptionStatus::Trialing);
    assert!(!h.allowed(clinic_id, Feature::OnlineBooking).await);
    h.change_tier(clinic_id, "PLUS").await.unwrap();
    assert!(h.allowed(clinic_id, Feature::OnlineBooking).await);
    assert!(!h.allowed(clinic_id, Feature::MultiDoctor).await);

    // Trial ends without a saved method: grace while waiting for payment.
    let trial_end = h.snapshot(clinic_id).await.current_period_end;
    h.clock.set(trial_end);
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.entered_grace, 1);
    let snapshot = h.snapshot(clinic_id).await;
    assert_eq!(snapshot.status, SubscriptionStatus::Grace);
    assert_eq!(snapshot.grace_days_remaining, Some(7));

    // Manual payment during grace continues the period from trial end.
    h.clock.advance_days(2);
    assert_eq!(h.pay(clinic_id, "PLUS", "upi_ref_1").await, PaymentOutcome::Applied);
    let snapshot = h.snapshot(clinic_id).await;
    assert_eq!(snapshot.status, SubscriptionStatus::Active);
    assert_eq!(snapshot.current_period_start, trial_end);
    assert_eq!(snapshot.grace_days_remaining, None);

    // Auto-pay renews at the period boundary, exactly once.
    h.enable_auto_pay(clinic_id).await;
    h.clock.set(snapshot.current_period_end);
    assert_eq!(h.sweeper.sweep_once().await.unwrap().renewed, 1);
    assert_eq!(h.sweeper.sweep_once().await.unwrap().renewed, 0);
    assert_eq!(h.gateway.charge_count(), 1);
    let renewed = h.snapshot(clinic_id).await;
    assert_eq!(renewed.current_period_start, snapshot.current_period_end);

    // The next renewal is declined: grace, then suspension.
    h.gateway.push_outcome(Err(GatewayError::declined("insufficient funds")));
    h.clock.set(renewed.current_period_end);
    assert_eq!(h.sweeper.sweep_once().await.unwrap().entered_grace, 1);
    h.clock.advance_days(7);
    assert_eq!(h.sweeper.sweep_once().await.unwrap().suspended, 1);
    assert_eq!(h.snapshot(clinic_id).await.status, SubscriptionStatus::Suspended);
    assert!(!h.allowed(clinic_id, Feature::OnlineBooking).await);
    assert!(h.allowed(clinic_id, Feature::PatientRecords).await);

    // Paying again reactivates with a fresh period.
    let now = h.clock.now();
    assert_eq!(h.pay(clinic_id, "PLUS", "upi_ref_2").await, PaymentOutcome::Applied);
    let reactivated = h.snapshot(clinic_id).await;
    assert_eq!(reactivated.status, SubscriptionStatus::Active);
    assert_eq!(reactivated.current_period_start, now);
    assert!(h.allowed(clinic_id, Feature::OnlineBooking).await);

    assert_eq!(
        h.payment_statuses(clinic_id).await,
        vec![
            PaymentStatus::Paid,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Paid
        ]
    );
    assert!(h.bus.has_event("subscription.suspended"));
    assert!(h.bus.has_event("subscription.reactivated"));
}

#[tokio::test]
async fn replayed_payment_reference_is_applied_once() {
    let h = Harness::new();
    let clinic_id = ClinicId::new();
    h.provision(clinic_id).await.unwrap();

    assert_eq!(h.pay(clinic_id, "PLUS", "upi_ref_9").await, PaymentOutcome::Applied);
    let period_end = h.snapshot(clinic_id).await.current_period_end;
    assert_eq!(
        h.pay(clinic_id, "PLUS", "upi_ref_9").await,
        PaymentOutcome::AlreadyApplied
    );

    assert_eq!(h.snapshot(clinic_id).await.current_period_end, period_end);
    assert_eq!(h.payment_statuses(clinic_id).await.len(), 1);
}

#[tokio::test]
async fn downgrade_is_blocked_while_usage_exceeds_target_limits() {
    let h = Harness::new();
    let clinic_id = ClinicId::new();
    h.provision(clinic_id).await.unwrap();
    h.pay(clinic_id, "PLUS", "upi_ref_3").await;
    h.usage
        .set_usage(
            clinic_id,
            TenantUsage {
                patients: 100,
                doctors: 4,
                storage_bytes: 0,
                branches: 1,
            },
        )
        .await;

    let err = h.change_tier(clinic_id, "CORE").await.unwrap_err();
    assert!(matches!(
        err,
        SubscriptionError::DowngradeBlocked {
            target: Tier::Core,
            ..
        }
    ));
    assert_eq!(h.snapshot(clinic_id).await.tier, Tier::Plus);

    h.change_tier(clinic_id, "PRO").await.unwrap();
    assert_eq!(h.snapshot(clinic_id).await.tier, Tier::Pro);
}

#[tokio::test]
async fn override_grants_access_until_deactivation() {
    let h = Harness::new();
    let clinic_id = ClinicId::new();
    h.provision(clinic_id).await.unwrap();

    SetFeatureOverrideHandler::new(h.overrides.clone(), h.bus.clone(), h.clock.clone())
        .handle(SetFeatureOverrideCommand {
            clinic_id,
            feature: Feature::MultiDoctor,
            enabled: Some(true),
        })
        .await
        .unwrap();
    let decision = CheckFeatureAccessHandler::new(
        h.store.clone(),
        h.overrides.clone(),
        h.catalog.clone(),
    )
    .handle(CheckFeatureAccessQuery {
        clinic_id,
        feature: Feature::MultiDoctor,
    })
    .await
    .unwrap();
    assert_eq!(
        decision,
        AccessDecision::Allowed {
            feature: Feature::MultiDoctor,
            via_override: true
        }
    );

    DeactivateClinicHandler::new(
        h.store.clone(),
        h.overrides.clone(),
        h.bus.clone(),
        h.clock.clone(),
    )
    .handle(DeactivateClinicCommand { clinic_id })
    .await
    .unwrap();

    assert_eq!(h.snapshot(clinic_id).await.status, SubscriptionStatus::Cancelled);
    assert!(!h.allowed(clinic_id, Feature::MultiDoctor).await);

    // Reprovisioning starts a fresh trial record.
    h.provision(clinic_id).await.unwrap();
    assert_eq!(h.snapshot(clinic_id).await.status, SubscriptionStatus::Trialing);
}

#[tokio::test]
async fn second_live_subscription_is_rejected() {
    let h = Harness::new();
    let clinic_id = ClinicId::new();
    h.provision(clinic_id).await.unwrap();

    assert!(matches!(
        h.provision(clinic_id).await,
        Err(SubscriptionError::AlreadyExists(_))
    ));
}
