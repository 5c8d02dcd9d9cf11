//! Event infrastructure for domain event publishing.
//!
//! - `DomainEvent` - Trait that all domain events implement
//! - `EventEnvelope` - Transport wrapper handed to `EventPublisher`

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{EventId, Timestamp};

/// Trait that all domain events must implement.
pub trait DomainEvent: Send + Sync {
    /// Returns the dotted event type string (e.g., "subscription.renewed").
    fn event_type(&self) -> &'static str;

    /// Returns the ID of the aggregate that emitted this event.
    fn aggregate_id(&self) -> String;

    /// Returns the type of aggregate (e.g., "Subscription").
    fn aggregate_type(&self) -> &'static str;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> Timestamp;
}

/// Transport wrapper for serialized domain events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub occurred_at: Timestamp,
    pub payload: JsonValue,
}

impl EventEnvelope {
    /// Wraps a serializable domain event.
    pub fn from_event<E>(event: &E) -> Result<Self, serde_json::Error>
    where
        E: DomainEvent + Serialize,
    {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id(),
            aggregate_type: event.aggregate_type().to_string(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// Deserializes the payload back into a typed event.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pinged {
        target: String,
        at: Timestamp,
    }

    impl DomainEvent for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn aggregate_id(&self) -> String {
            self.target.clone()
        }

        fn aggregate_type(&self) -> &'static str {
            "Test"
        }

        fn occurred_at(&self) -> Timestamp {
            self.at
        }
    }

    #[test]
    fn envelope_copies_event_metadata() {
        let event = Pinged {
            target: "abc".to_string(),
            at: Timestamp::now(),
        };
        let envelope = EventEnvelope::from_event(&event).unwrap();

        assert_eq!(envelope.event_type, "test.pinged");
        assert_eq!(envelope.aggregate_id, "abc");
        assert_eq!(envelope.aggregate_type, "Test");
        assert_eq!(envelope.occurred_at, event.at);
        assert_eq!(envelope.payload_as::<Pinged>().unwrap(), event);
    }
}
