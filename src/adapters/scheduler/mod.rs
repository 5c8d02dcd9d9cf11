//! Background workers.
//!
//! - `LifecycleSweeper` - Periodically advances due subscriptions

mod lifecycle_sweeper;

pub use lifecycle_sweeper::{LifecycleSweeper, SweepReport, SweeperConfig};
