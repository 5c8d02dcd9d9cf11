//! AdvanceLifecycleHandler - Applies whatever transition is due for one
//! subscription.
//!
//! Called by the sweep for every due record. Safe to run from several
//! workers at once: the loser of a version race reports `Conflict` and
//! changes nothing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::application::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::catalog::Catalog;
use crate::domain::foundation::{DomainError, ErrorCode, Money, SubscriptionId, Timestamp};
use crate::domain::subscription::{
    DueAction, GatewayPaymentId, LifecycleEvent, PaymentRecord, Subscription, SubscriptionError,
    SubscriptionEvent, SubscriptionStatus, Transition,
};
use crate::ports::{
    ChargeReceipt, ChargeRequest, Clock, EventPublisher, GatewayError, PaymentGateway,
    SubscriptionChange, SubscriptionRepository,
};

use super::publish_events;

#[derive(Debug, Clone)]
pub struct AdvanceLifecycleCommand {
    pub subscription_id: SubscriptionId,
}

/// What happened to the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOutcome {
    /// Nothing due at this moment.
    NotDue,
    Renewed,
    /// Trial converted to a paid period.
    Activated,
    EnteredGrace,
    Suspended,
    Cancelled,
    /// Gateway unreachable; left as is for the next sweep.
    Deferred { attempt: u32 },
    /// Another worker changed the record first.
    Conflict,
}

/// Renewal charging settings.
#[derive(Debug, Clone)]
pub struct RenewalSettings {
    /// Retries inside one sweep pass, for transport failures only.
    pub retry: RetryPolicy,
    pub charge_timeout: Duration,
    /// Sweep passes with transport failures before taking the decline path.
    pub max_renewal_attempts: u32,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            charge_timeout: Duration::from_secs(10),
            max_renewal_attempts: 3,
        }
    }
}

pub struct AdvanceLifecycleHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    catalog: Arc<Catalog>,
    settings: RenewalSettings,
}

impl AdvanceLifecycleHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        catalog: Arc<Catalog>,
        settings: RenewalSettings,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            event_publisher,
            clock,
            catalog,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: AdvanceLifecycleCommand,
    ) -> Result<LifecycleOutcome, SubscriptionError> {
        let subscription = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

        let now = self.clock.now();
        let Some(action) = subscription.due_action(now) else {
            return Ok(LifecycleOutcome::NotDue);
        };

        tracing::debug!(
            subscription_id = %subscription.id,
            action = ?action,
            "advancing subscription"
        );

        match action {
            DueAction::ChargeRenewal => self.renew(subscription, now).await,
            other => {
                let mut subscription = subscription;
                let expected_version = subscription.version;
                let transition = subscription.apply(other.event(), now)?;
                let change = SubscriptionChange::new(subscription.clone(), expected_version);
                self.commit(change, &transition, Vec::new(), now).await
            }
        }
    }

    async fn renew(
        &self,
        mut subscription: Subscription,
        now: Timestamp,
    ) -> Result<LifecycleOutcome, SubscriptionError> {
        let expected_version = subscription.version;

        let (Some(amount), Some(method)) = (
            subscription.renewal_charge(&self.catalog.tiers),
            subscription.payment_method.clone(),
        ) else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "no renewal price or method, treating renewal as failed"
            );
            let transition = subscription.apply(LifecycleEvent::RenewalFailed, now)?;
            let change = SubscriptionChange::new(subscription.clone(), expected_version);
            return self.commit(change, &transition, Vec::new(), now).await;
        };

        let request = ChargeRequest {
            amount: amount.clone(),
            method,
            idempotency_key: subscription.renewal_idempotency_key(),
            description: format!("{} renewal", self.catalog.tiers.get(subscription.tier).display_name),
        };

        match self.charge(request).await {
            Ok(receipt) => {
                let transition = subscription.apply(LifecycleEvent::RenewalCharged, now)?;
                if let Some(list_price) = self
                    .catalog
                    .tiers
                    .list_price(subscription.tier, subscription.billing_cycle)
                {
                    subscription.price_at_snapshot = Some(list_price);
                }
                let payment = PaymentRecord::paid(
                    subscription.id,
                    amount.clone(),
                    receipt.gateway_payment_id.clone(),
                    self.gateway.name(),
                    Some("automatic renewal".to_string()),
                    now,
                );
                let events = vec![SubscriptionEvent::PaymentRecorded {
                    subscription_id: subscription.id,
                    clinic_id: subscription.clinic_id,
                    amount,
                    gateway_payment_id: receipt.gateway_payment_id.to_string(),
                    occurred_at: now,
                }];
                let change = SubscriptionChange::new(subscription.clone(), expected_version)
                    .with_payment(payment);
                self.commit(change, &transition, events, now).await
            }
            Err(GatewayError::Declined {
                reason,
                gateway_payment_id,
            }) => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    reason = %reason,
                    "renewal declined"
                );
                self.fail_renewal(subscription, expected_version, amount, gateway_payment_id, reason, now)
                    .await
            }
            Err(GatewayError::Transport { reason }) => {
                let attempt = subscription.record_deferred_renewal(now);
                if attempt >= self.settings.max_renewal_attempts {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        attempt,
                        reason = %reason,
                        "renewal retry budget exhausted, treating as declined"
                    );
                    let reason = format!("gateway unreachable after {} attempts: {}", attempt, reason);
                    return self
                        .fail_renewal(subscription, expected_version, amount, None, reason, now)
                        .await;
                }

                tracing::warn!(
                    subscription_id = %subscription.id,
                    attempt,
                    reason = %reason,
                    "renewal deferred, gateway unavailable"
                );
                let events = vec![SubscriptionEvent::RenewalDeferred {
                    subscription_id: subscription.id,
                    clinic_id: subscription.clinic_id,
                    attempt,
                    occurred_at: now,
                }];
                let change = SubscriptionChange::new(subscription.clone(), expected_version);
                match self.commit_change(change).await? {
                    None => Ok(LifecycleOutcome::Conflict),
                    Some(_) => {
                        publish_events(self.event_publisher.as_ref(), events).await;
                        Ok(LifecycleOutcome::Deferred { attempt })
                    }
                }
            }
            Err(err @ GatewayError::Misconfigured { .. }) => {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "renewal charge rejected by gateway configuration"
                );
                Err(err.into())
            }
        }
    }

    /// One charge, with in-pass retries for transport failures. Each attempt
    /// is bounded by the charge timeout.
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let timeout = self.settings.charge_timeout;
        retry_with_backoff(&self.settings.retry, GatewayError::is_retryable, || {
            let request = request.clone();
            async move {
                match tokio::time::timeout(timeout, self.gateway.charge(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::transport(format!(
                        "charge timed out after {}ms",
                        timeout.as_millis()
                    ))),
                }
            }
        })
        .await
    }

    async fn fail_renewal(
        &self,
        mut subscription: Subscription,
        expected_version: u64,
        amount: Money,
        gateway_payment_id: Option<GatewayPaymentId>,
        reason: String,
        now: Timestamp,
    ) -> Result<LifecycleOutcome, SubscriptionError> {
        let transition = subscription.apply(LifecycleEvent::RenewalFailed, now)?;
        let payment = PaymentRecord::failed(
            subscription.id,
            amount.clone(),
            gateway_payment_id,
            self.gateway.name(),
            reason.clone(),
            now,
        );
        let events = vec![SubscriptionEvent::PaymentFailed {
            subscription_id: subscription.id,
            clinic_id: subscription.clinic_id,
            amount,
            reason,
            occurred_at: now,
        }];
        let change =
            SubscriptionChange::new(subscription.clone(), expected_version).with_payment(payment);
        self.commit(change, &transition, events, now).await
    }

    /// Commits and publishes, mapping a lost race to `Conflict`.
    async fn commit(
        &self,
        change: SubscriptionChange,
        transition: &Transition,
        mut events: Vec<SubscriptionEvent>,
        now: Timestamp,
    ) -> Result<LifecycleOutcome, SubscriptionError> {
        let mut subscription = change.subscription.clone();
        let Some(version) = self.commit_change(change).await? else {
            return Ok(LifecycleOutcome::Conflict);
        };
        subscription.version = version;

        if transition.changed() {
            tracing::info!(
                subscription_id = %subscription.id,
                clinic_id = %subscription.clinic_id,
                from = %transition.from,
                to = %transition.to,
                period_end = %subscription.current_period_end,
                "lifecycle transition"
            );
        }
        events.extend(SubscriptionEvent::from_transition(&subscription, transition, now));
        publish_events(self.event_publisher.as_ref(), events).await;

        Ok(outcome_of(transition))
    }

    /// `None` when another writer won.
    async fn commit_change(&self, change: SubscriptionChange) -> Result<Option<u64>, SubscriptionError> {
        let subscription_id = change.subscription.id;
        match self.subscriptions.commit(change).await {
            Ok(version) => Ok(Some(version)),
            Err(err) if is_lost_race(&err) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    code = %err.code,
                    "subscription changed by another worker, skipping"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn is_lost_race(err: &DomainError) -> bool {
    err.is_conflict() || err.code == ErrorCode::DuplicatePayment
}

fn outcome_of(transition: &Transition) -> LifecycleOutcome {
    use SubscriptionStatus::*;
    match (transition.from, transition.to) {
        _ if !transition.changed() => LifecycleOutcome::NotDue,
        (Active, Active) => LifecycleOutcome::Renewed,
        (_, Active) => LifecycleOutcome::Activated,
        (_, Grace) => LifecycleOutcome::EnteredGrace,
        (_, Suspended) => LifecycleOutcome::Suspended,
        (_, Cancelled) => LifecycleOutcome::Cancelled,
        (_, Trialing) => LifecycleOutcome::NotDue,
    }
}
