//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `clock` - System and fixed clocks
//! - `events` - Event publishers (in-memory, structured log)
//! - `http` - Axum REST API
//! - `memory` - In-process stores for tests and database-less runs
//! - `postgres` - sqlx-backed stores
//! - `razorpay` - Payment gateway client and webhook verification
//! - `scheduler` - The lifecycle sweep worker

pub mod clock;
pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod razorpay;
pub mod scheduler;

pub use clock::{FixedClock, SystemClock};
pub use events::{InMemoryEventBus, TracingEventPublisher};
