//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types that form the
//! vocabulary of the billing domain.

mod errors;
mod events;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope};
pub use ids::{ClinicId, EventId, PaymentId, SubscriptionId};
pub use money::Money;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
