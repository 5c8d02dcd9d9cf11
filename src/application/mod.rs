//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers commit through the repository's optimistic lock and
//! publish events after the commit; query handlers only read.

pub mod handlers;
pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
