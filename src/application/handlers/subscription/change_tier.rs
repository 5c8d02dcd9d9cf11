//! ChangeTierHandler - Administrative tier change without a payment.

use std::sync::Arc;

use crate::domain::catalog::Catalog;
use crate::domain::foundation::ClinicId;
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionEvent, TierChange};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository, UsageReader};

use super::{ensure_within_limits, is_downgrade, publish_events, update_current, usage_for_target};

/// Command to move a clinic to another tier.
#[derive(Debug, Clone)]
pub struct ChangeTierCommand {
    pub clinic_id: ClinicId,
    /// Tier name; `INTELLIGENCE` turns the add-on on.
    pub new_tier: String,
    /// Also turn the Intelligence add-on off.
    pub drop_intelligence: bool,
}

#[derive(Debug, Clone)]
pub struct ChangeTierResult {
    pub subscription: Subscription,
    pub change: TierChange,
}

/// Handler for administrative tier changes.
///
/// Status and billing period are untouched. Downgrades are refused while
/// the clinic's usage exceeds the target tier's limits.
pub struct ChangeTierHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    usage: Arc<dyn UsageReader>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    catalog: Arc<Catalog>,
}

impl ChangeTierHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        usage: Arc<dyn UsageReader>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            subscriptions,
            usage,
            event_publisher,
            clock,
            catalog,
        }
    }

    pub async fn handle(&self, cmd: ChangeTierCommand) -> Result<ChangeTierResult, SubscriptionError> {
        let target = self
            .catalog
            .tiers
            .lookup(&cmd.new_tier)
            .map(|definition| definition.tier)
            .map_err(|_| SubscriptionError::invalid_tier(&cmd.new_tier))?;

        let usage = usage_for_target(self.usage.as_ref(), &cmd.clinic_id, target).await?;
        let limits = self.catalog.tiers.get(target).limits;
        let now = self.clock.now();

        let (subscription, change) =
            update_current(self.subscriptions.as_ref(), &cmd.clinic_id, |sub| {
                if let (true, Some(usage)) = (is_downgrade(sub.tier, target), usage.as_ref()) {
                    ensure_within_limits(target, &limits, usage)?;
                }

                let mut change = sub.change_tier(target, now)?;
                if cmd.drop_intelligence {
                    change.has_intelligence = sub.remove_addon(now)?.has_intelligence;
                }
                Ok(change)
            })
            .await?;

        if change.changed() {
            tracing::info!(
                subscription_id = %subscription.id,
                clinic_id = %subscription.clinic_id,
                from_tier = %change.from_tier,
                to_tier = %change.to_tier,
                has_intelligence = change.has_intelligence,
                "tier changed"
            );
            publish_events(
                self.event_publisher.as_ref(),
                vec![SubscriptionEvent::TierChanged {
                    subscription_id: subscription.id,
                    clinic_id: subscription.clinic_id,
                    from_tier: change.from_tier,
                    to_tier: change.to_tier,
                    has_intelligence: change.has_intelligence,
                    occurred_at: now,
                }],
            )
            .await;
        }

        Ok(ChangeTierResult {
            subscription,
            change,
        })
    }
}
