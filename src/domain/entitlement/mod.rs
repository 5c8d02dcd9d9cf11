//! Feature entitlement.
//!
//! Answers "may this clinic use this feature?" from the tenant's state and
//! the feature map. Nothing here does I/O.

mod resolver;
mod state;

pub use resolver::{AccessDecision, DenialReason, EntitlementResolver};
pub use state::TenantEntitlementState;
