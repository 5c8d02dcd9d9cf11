//! SetFeatureOverrideHandler - Support/sales grant or revoke of a single
//! feature for one clinic.

use std::sync::Arc;

use crate::domain::catalog::Feature;
use crate::domain::foundation::{ClinicId, DomainError, EventEnvelope};
use crate::domain::subscription::SubscriptionEvent;
use crate::ports::{Clock, EventPublisher, OverrideRepository};

#[derive(Debug, Clone, Copy)]
pub struct SetFeatureOverrideCommand {
    pub clinic_id: ClinicId,
    pub feature: Feature,
    /// `None` removes the override.
    pub enabled: Option<bool>,
}

pub struct SetFeatureOverrideHandler {
    overrides: Arc<dyn OverrideRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl SetFeatureOverrideHandler {
    pub fn new(
        overrides: Arc<dyn OverrideRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            overrides,
            event_publisher,
            clock,
        }
    }

    pub async fn handle(&self, cmd: SetFeatureOverrideCommand) -> Result<(), DomainError> {
        self.overrides
            .set(&cmd.clinic_id, cmd.feature, cmd.enabled)
            .await?;

        tracing::info!(
            clinic_id = %cmd.clinic_id,
            feature = %cmd.feature,
            enabled = ?cmd.enabled,
            "feature override changed"
        );

        let event = SubscriptionEvent::OverrideChanged {
            clinic_id: cmd.clinic_id,
            feature: cmd.feature,
            enabled: cmd.enabled,
            occurred_at: self.clock.now(),
        };
        match EventEnvelope::from_event(&event) {
            Ok(envelope) => {
                if let Err(err) = self.event_publisher.publish(envelope).await {
                    tracing::warn!(error = %err, "failed to publish override event");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize override event"),
        }
        Ok(())
    }
}
