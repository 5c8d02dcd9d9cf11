//! SetAutoPayHandler - Turns automatic renewal charging on or off.

use std::sync::Arc;

use crate::domain::foundation::ClinicId;
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionEvent};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository};

use super::{publish_events, update_current};

#[derive(Debug, Clone)]
pub struct SetAutoPayCommand {
    pub clinic_id: ClinicId,
    pub enabled: bool,
}

/// Enabling requires a saved payment method. Disabling always succeeds.
pub struct SetAutoPayHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl SetAutoPayHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            event_publisher,
            clock,
        }
    }

    pub async fn handle(&self, cmd: SetAutoPayCommand) -> Result<Subscription, SubscriptionError> {
        let now = self.clock.now();
        let (subscription, changed) = update_current(self.subscriptions.as_ref(), &cmd.clinic_id, |sub| {
            sub.set_auto_pay(cmd.enabled, now)
        })
        .await?;

        if changed {
            tracing::info!(
                subscription_id = %subscription.id,
                clinic_id = %subscription.clinic_id,
                enabled = cmd.enabled,
                "auto-pay changed"
            );
            publish_events(
                self.event_publisher.as_ref(),
                vec![SubscriptionEvent::AutoPayChanged {
                    subscription_id: subscription.id,
                    clinic_id: subscription.clinic_id,
                    enabled: cmd.enabled,
                    occurred_at: now,
                }],
            )
            .await;
        }

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::test_support::Fixture;
    use crate::domain::subscription::PaymentMethodRef;

    fn handler(fx: &Fixture) -> SetAutoPayHandler {
        SetAutoPayHandler::new(fx.store.clone(), fx.bus.clone(), fx.clock.clone())
    }

    #[tokio::test]
    async fn enabling_without_method_fails_and_changes_nothing() {
        let fx = Fixture::new();
        let sub = fx.seed(|_| {}).await;

        let err = handler(&fx)
            .handle(SetAutoPayCommand {
                clinic_id: sub.clinic_id,
                enabled: true,
            })
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::no_payment_method(sub.id));
        assert_eq!(fx.reload(&sub).await, sub);
    }

    #[tokio::test]
    async fn enabling_with_method_succeeds_once() {
        let fx = Fixture::new();
        let sub = fx
            .seed(|s| s.payment_method = Some(PaymentMethodRef::new("token_1").unwrap()))
            .await;
        let handler = handler(&fx);
        let cmd = SetAutoPayCommand {
            clinic_id: sub.clinic_id,
            enabled: true,
        };

        assert!(handler.handle(cmd.clone()).await.unwrap().auto_pay_enabled);
        handler.handle(cmd).await.unwrap();

        assert_eq!(fx.bus.events_of_type("subscription.auto_pay_changed").len(), 1);
    }

    #[tokio::test]
    async fn disabling_is_always_allowed() {
        let fx = Fixture::new();
        let sub = fx.seed(|_| {}).await;

        let result = handler(&fx)
            .handle(SetAutoPayCommand {
                clinic_id: sub.clinic_id,
                enabled: false,
            })
            .await
            .unwrap();
        assert!(!result.auto_pay_enabled);
    }
}
