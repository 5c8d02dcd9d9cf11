//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Subscription aggregate with optimistic locking
//! - `PaymentLedger` - Payment history and idempotency lookups
//! - `OverrideRepository` - Per-clinic feature overrides
//!
//! ## External Service Ports
//!
//! - `PaymentGateway` - Charges saved payment methods
//! - `UsageReader` - Clinic resource usage for downgrade checks
//! - `EventPublisher` - Publishes committed domain events
//! - `Clock` - Current time

mod clock;
mod event_publisher;
mod override_repository;
mod payment_gateway;
mod subscription_repository;
mod usage_reader;

pub use clock::Clock;
pub use event_publisher::EventPublisher;
pub use override_repository::OverrideRepository;
pub use payment_gateway::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway};
pub use subscription_repository::{PaymentLedger, SubscriptionChange, SubscriptionRepository};
pub use usage_reader::UsageReader;
