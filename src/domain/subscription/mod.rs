//! Subscription domain module.
//!
//! One subscription record per clinic, driven through its lifecycle by
//! payments and by the passage of time.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate and its transition function
//! - `status` - SubscriptionStatus state machine and state data
//! - `lifecycle` - Events fed into the transition function
//! - `payment` - Payment ledger entries
//! - `events` - Domain events published after commit

mod aggregate;
mod errors;
mod events;
mod lifecycle;
mod payment;
mod status;

pub use aggregate::{Subscription, SubscriptionPolicy, TierChange};
pub use errors::SubscriptionError;
pub use events::SubscriptionEvent;
pub use lifecycle::{DueAction, LifecycleEvent, Transition};
pub use payment::{GatewayPaymentId, PaymentMethodRef, PaymentRecord, PaymentStatus};
pub use status::{LifecycleState, SubscriptionStatus};
