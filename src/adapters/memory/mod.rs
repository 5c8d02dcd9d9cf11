//! In-memory adapters.
//!
//! Used by tests and by the binary when no database URL is configured.

mod override_store;
mod subscription_store;
mod usage_reader;

pub use override_store::InMemoryOverrideStore;
pub use subscription_store::InMemorySubscriptionStore;
pub use usage_reader::InMemoryUsageReader;
