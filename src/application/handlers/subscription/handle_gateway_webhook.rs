//! HandleGatewayWebhookHandler - Applies a verified gateway notification.
//!
//! Signature verification and payload parsing live in the gateway adapter;
//! this handler only sees the parsed event.

use std::sync::Arc;

use crate::domain::catalog::Catalog;
use crate::domain::foundation::{ClinicId, Money};
use crate::domain::subscription::{
    GatewayPaymentId, PaymentRecord, SubscriptionError, SubscriptionEvent,
};
use crate::ports::{Clock, EventPublisher, PaymentLedger, SubscriptionRepository, UsageReader};

use super::{
    load_current, publish_events, PaymentOutcome, ProcessPaymentCommand, ProcessPaymentHandler,
    ProcessPaymentResult, SubscriptionTarget,
};

/// A gateway notification after verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayWebhookEvent {
    PaymentCaptured {
        gateway_payment_id: String,
        amount_minor: i64,
        currency: String,
        /// Instrument reported by the gateway, e.g. `card`, `upi`.
        method: String,
        clinic_id: ClinicId,
        tier: String,
        notes: Option<String>,
    },
    PaymentFailed {
        gateway_payment_id: Option<String>,
        amount_minor: i64,
        currency: String,
        clinic_id: ClinicId,
        reason: String,
    },
    /// An event type this service does not act on.
    Ignored { event_type: String },
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Applied(Box<ProcessPaymentResult>),
    AlreadyApplied,
    FailureRecorded,
    /// A captured payment the subscription cannot take, e.g. the clinic's
    /// only record is cancelled. Acknowledged so the gateway stops
    /// redelivering; reconciliation happens outside this service.
    Unapplied { reason: String },
    Ignored,
}

pub struct HandleGatewayWebhookHandler {
    payments: ProcessPaymentHandler,
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn PaymentLedger>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl HandleGatewayWebhookHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn PaymentLedger>,
        usage: Arc<dyn UsageReader>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        catalog: Arc<Catalog>,
    ) -> Self {
        let payments = ProcessPaymentHandler::new(
            subscriptions.clone(),
            ledger.clone(),
            usage,
            event_publisher.clone(),
            clock.clone(),
            catalog,
        );
        Self {
            payments,
            subscriptions,
            ledger,
            event_publisher,
            clock,
        }
    }

    pub async fn handle(
        &self,
        event: GatewayWebhookEvent,
    ) -> Result<WebhookOutcome, SubscriptionError> {
        match event {
            GatewayWebhookEvent::PaymentCaptured {
                gateway_payment_id,
                amount_minor,
                currency,
                method,
                clinic_id,
                tier,
                notes,
            } => {
                let applied = self
                    .payments
                    .handle(ProcessPaymentCommand {
                        target: SubscriptionTarget::Clinic(clinic_id),
                        amount_minor,
                        currency,
                        new_tier: tier,
                        payment_method: format!("razorpay:{}", method),
                        gateway_payment_id: gateway_payment_id.clone(),
                        notes,
                    })
                    .await;
                let result = match applied {
                    Ok(result) => result,
                    Err(
                        err @ (SubscriptionError::InvalidState { .. }
                        | SubscriptionError::DowngradeBlocked { .. }),
                    ) => {
                        tracing::warn!(
                            clinic_id = %clinic_id,
                            gateway_payment_id = %gateway_payment_id,
                            error = %err,
                            "captured payment could not be applied"
                        );
                        return Ok(WebhookOutcome::Unapplied {
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err),
                };
                Ok(match result.outcome {
                    PaymentOutcome::Applied => WebhookOutcome::Applied(Box::new(result)),
                    PaymentOutcome::AlreadyApplied => WebhookOutcome::AlreadyApplied,
                })
            }
            GatewayWebhookEvent::PaymentFailed {
                gateway_payment_id,
                amount_minor,
                currency,
                clinic_id,
                reason,
            } => {
                let now = self.clock.now();
                let amount = Money::new(amount_minor, &currency)?;
                let gateway_payment_id = gateway_payment_id
                    .map(GatewayPaymentId::new)
                    .transpose()?;
                let subscription = load_current(self.subscriptions.as_ref(), &clinic_id).await?;

                let record = PaymentRecord::failed(
                    subscription.id,
                    amount.clone(),
                    gateway_payment_id,
                    "razorpay",
                    reason.clone(),
                    now,
                );
                self.ledger.append(&record).await?;

                tracing::info!(
                    subscription_id = %subscription.id,
                    clinic_id = %clinic_id,
                    reason = %reason,
                    "gateway reported failed payment"
                );
                publish_events(
                    self.event_publisher.as_ref(),
                    vec![SubscriptionEvent::PaymentFailed {
                        subscription_id: subscription.id,
                        clinic_id,
                        amount,
                        reason,
                        occurred_at: now,
                    }],
                )
                .await;
                Ok(WebhookOutcome::FailureRecorded)
            }
            GatewayWebhookEvent::Ignored { event_type } => {
                tracing::debug!(event_type = %event_type, "ignoring gateway webhook");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}
