//! Event publisher adapters.
//!
//! - `InMemoryEventBus` - In-process capture for tests
//! - `TracingEventPublisher` - Structured audit log lines for the binary

mod in_memory;
mod tracing_publisher;

pub use in_memory::InMemoryEventBus;
pub use tracing_publisher::TracingEventPublisher;
