//! DeactivateClinicHandler - Soft reset of a clinic's billing state.

use std::sync::Arc;

use crate::domain::foundation::ClinicId;
use crate::domain::subscription::{
    LifecycleEvent, Subscription, SubscriptionError, SubscriptionEvent,
};
use crate::ports::{Clock, EventPublisher, OverrideRepository, SubscriptionRepository};

use super::{publish_events, update_current};

#[derive(Debug, Clone)]
pub struct DeactivateClinicCommand {
    pub clinic_id: ClinicId,
}

/// Clears the clinic's overrides and cancels its subscription immediately.
///
/// Returns the cancelled record, or `None` when the clinic never had one.
pub struct DeactivateClinicHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    overrides: Arc<dyn OverrideRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl DeactivateClinicHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        overrides: Arc<dyn OverrideRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            overrides,
            event_publisher,
            clock,
        }
    }

    pub async fn handle(
        &self,
        cmd: DeactivateClinicCommand,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        self.overrides.clear(&cmd.clinic_id).await?;

        if self
            .subscriptions
            .find_current_for_clinic(&cmd.clinic_id)
            .await?
            .is_none()
        {
            return Ok(None);
        }

        let now = self.clock.now();
        let (subscription, transition) =
            update_current(self.subscriptions.as_ref(), &cmd.clinic_id, |sub| {
                sub.apply(LifecycleEvent::AdministrativeCancel, now)
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            clinic_id = %cmd.clinic_id,
            from = %transition.from,
            "clinic deactivated"
        );
        publish_events(
            self.event_publisher.as_ref(),
            SubscriptionEvent::from_transition(&subscription, &transition, now)
                .into_iter()
                .collect(),
        )
        .await;

        Ok(Some(subscription))
    }
}
