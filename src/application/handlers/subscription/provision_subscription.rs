//! ProvisionSubscriptionHandler - Command handler for starting a clinic's trial.

use std::sync::Arc;

use crate::domain::catalog::Catalog;
use crate::domain::foundation::{ClinicId, ErrorCode};
use crate::domain::subscription::{
    Subscription, SubscriptionError, SubscriptionEvent, SubscriptionPolicy, SubscriptionStatus,
};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository};

use super::publish_events;

/// Command to provision a subscription for a new or returning clinic.
#[derive(Debug, Clone)]
pub struct ProvisionSubscriptionCommand {
    pub clinic_id: ClinicId,
}

/// Handler for tenant provisioning.
///
/// Creates a `Trialing` subscription on the entry tier. A clinic whose last
/// record is cancelled gets a new record.
pub struct ProvisionSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    catalog: Arc<Catalog>,
    policy: SubscriptionPolicy,
}

impl ProvisionSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        catalog: Arc<Catalog>,
        policy: SubscriptionPolicy,
    ) -> Self {
        Self {
            subscriptions,
            event_publisher,
            clock,
            catalog,
            policy,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProvisionSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        if let Some(existing) = self.subscriptions.find_current_for_clinic(&cmd.clinic_id).await? {
            if existing.status() != SubscriptionStatus::Cancelled {
                return Err(SubscriptionError::already_exists(cmd.clinic_id));
            }
        }

        let now = self.clock.now();
        let subscription = Subscription::provision(cmd.clinic_id, self.policy, &self.catalog.tiers, now)?;

        self.subscriptions
            .insert(&subscription)
            .await
            .map_err(|err| match err.code {
                ErrorCode::SubscriptionExists => SubscriptionError::already_exists(cmd.clinic_id),
                _ => err.into(),
            })?;

        tracing::info!(
            subscription_id = %subscription.id,
            clinic_id = %subscription.clinic_id,
            trial_ends_at = %subscription.current_period_end,
            "subscription provisioned"
        );

        publish_events(
            self.event_publisher.as_ref(),
            vec![SubscriptionEvent::Provisioned {
                subscription_id: subscription.id,
                clinic_id: subscription.clinic_id,
                tier: subscription.tier,
                trial_ends_at: subscription.current_period_end,
                occurred_at: now,
            }],
        )
        .await;

        Ok(subscription)
    }
}
