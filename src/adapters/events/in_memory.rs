//! In-memory event bus for testing.
//!
//! Captures every published envelope for assertions. Can be switched into
//! a failing mode to check that publish failures never undo a commit.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::EventPublisher;

/// In-memory event bus.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// bus.publish(envelope).await?;
///
/// assert_eq!(bus.event_count(), 1);
/// assert!(bus.has_event("subscription.renewed"));
/// ```
#[derive(Default)]
pub struct InMemoryEventBus {
    published: Mutex<Vec<EventEnvelope>>,
    failing: AtomicBool,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn published(&self) -> MutexGuard<'_, Vec<EventEnvelope>> {
        self.published.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Test Helpers ===

    /// Makes every later publish fail with `InternalError`.
    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published().clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.published().iter().map(|e| e.event_type.clone()).collect()
    }

    pub fn event_count(&self) -> usize {
        self.published().len()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.published().iter().any(|e| e.event_type == event_type)
    }

    pub fn clear(&self) {
        self.published().clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "event bus unavailable",
            ));
        }
        self.published().push(event);
        Ok(())
    }
}
