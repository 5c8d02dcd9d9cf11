//! AttachPaymentMethodHandler - Saves a chargeable payment method token.

use std::sync::Arc;

use crate::domain::foundation::ClinicId;
use crate::domain::subscription::{PaymentMethodRef, Subscription, SubscriptionError};
use crate::ports::{Clock, SubscriptionRepository};

use super::update_current;

#[derive(Debug, Clone)]
pub struct AttachPaymentMethodCommand {
    pub clinic_id: ClinicId,
    /// Gateway token for the saved card or mandate.
    pub token: String,
}

pub struct AttachPaymentMethodHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
}

impl AttachPaymentMethodHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            clock,
        }
    }

    pub async fn handle(
        &self,
        cmd: AttachPaymentMethodCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let method = PaymentMethodRef::new(cmd.token)?;
        let now = self.clock.now();

        let (subscription, ()) = update_current(self.subscriptions.as_ref(), &cmd.clinic_id, |sub| {
            sub.attach_payment_method(method.clone(), now)
        })
        .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            clinic_id = %subscription.clinic_id,
            "payment method attached"
        );
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::test_support::Fixture;

    #[tokio::test]
    async fn attaches_token() {
        let fx = Fixture::new();
        let sub = fx.seed(|_| {}).await;

        let result = AttachPaymentMethodHandler::new(fx.store.clone(), fx.clock.clone())
            .handle(AttachPaymentMethodCommand {
                clinic_id: sub.clinic_id,
                token: "token_abc".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            result.payment_method.as_ref().map(PaymentMethodRef::as_str),
            Some("token_abc")
        );
        assert_eq!(result.version, 1);
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let fx = Fixture::new();
        let sub = fx.seed(|_| {}).await;

        let err = AttachPaymentMethodHandler::new(fx.store.clone(), fx.clock.clone())
            .handle(AttachPaymentMethodCommand {
                clinic_id: sub.clinic_id,
                token: "  ".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::Validation { .. }));
    }
}
