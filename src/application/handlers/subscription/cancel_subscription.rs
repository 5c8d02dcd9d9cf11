//! Cancel / Resume handlers - Schedule or withdraw cancellation at period end.

use std::sync::Arc;

use crate::domain::foundation::ClinicId;
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{Clock, SubscriptionRepository};

use super::update_current;

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub clinic_id: ClinicId,
}

/// Sets `cancel_at_period_end`. The sweep cancels at the boundary without
/// attempting a renewal.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
}

impl CancelSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            clock,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let now = self.clock.now();
        let (subscription, _) = update_current(self.subscriptions.as_ref(), &cmd.clinic_id, |sub| {
            sub.request_cancellation(now)
        })
        .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            clinic_id = %subscription.clinic_id,
            effective_at = %subscription.current_period_end,
            "cancellation scheduled"
        );
        Ok(subscription)
    }
}

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionCommand {
    pub clinic_id: ClinicId,
}

/// Clears a scheduled cancellation. Fails once the record is cancelled.
pub struct ResumeSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
}

impl ResumeSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            clock,
        }
    }

    pub async fn handle(
        &self,
        cmd: ResumeSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let now = self.clock.now();
        let (subscription, _) =
            update_current(self.subscriptions.as_ref(), &cmd.clinic_id, |sub| sub.resume(now)).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            clinic_id = %subscription.clinic_id,
            "scheduled cancellation withdrawn"
        );
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::test_support::Fixture;
    use crate::domain::subscription::{LifecycleEvent, SubscriptionStatus};

    #[tokio::test]
    async fn cancel_then_resume() {
        let fx = Fixture::new();
        let sub = fx.seed(|_| {}).await;

        let cancelled = CancelSubscriptionHandler::new(fx.store.clone(), fx.clock.clone())
            .handle(CancelSubscriptionCommand {
                clinic_id: sub.clinic_id,
            })
            .await
            .unwrap();
        assert!(cancelled.cancel_at_period_end);
        assert_eq!(cancelled.status(), SubscriptionStatus::Trialing);

        let resumed = ResumeSubscriptionHandler::new(fx.store.clone(), fx.clock.clone())
            .handle(ResumeSubscriptionCommand {
                clinic_id: sub.clinic_id,
            })
            .await
            .unwrap();
        assert!(!resumed.cancel_at_period_end);
    }

    #[tokio::test]
    async fn resume_fails_once_cancelled() {
        let fx = Fixture::new();
        let sub = fx
            .seed(|s| {
                s.apply(LifecycleEvent::AdministrativeCancel, Fixture::start())
                    .unwrap();
            })
            .await;

        let err = ResumeSubscriptionHandler::new(fx.store.clone(), fx.clock.clone())
            .handle(ResumeSubscriptionCommand {
                clinic_id: sub.clinic_id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::InvalidState { .. }));
    }
}
