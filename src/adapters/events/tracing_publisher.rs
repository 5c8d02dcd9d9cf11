//! Event publisher that writes each event as a structured audit log line.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

/// Emits one `info!` line per event on the `audit` target.
///
/// Audit storage is whatever consumes the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        tracing::info!(
            target: "audit",
            event_id = %event.event_id,
            event_type = %event.event_type,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            occurred_at = %event.occurred_at,
            payload = %event.payload,
            "domain event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{EventId, Timestamp};

    #[tokio::test]
    async fn publishing_never_fails() {
        let publisher = TracingEventPublisher::new();
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            event_type: "subscription.cancelled".to_string(),
            aggregate_id: "sub-1".to_string(),
            aggregate_type: "Subscription".to_string(),
            occurred_at: Timestamp::now(),
            payload: serde_json::json!({ "type": "cancelled" }),
        };
        assert!(publisher.publish(envelope).await.is_ok());
    }
}
