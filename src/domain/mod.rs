//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, money, timestamps, errors)
//! - `catalog` - Tiers, pricing, limits and the feature map
//! - `entitlement` - Pure feature access decisions
//! - `subscription` - Subscription lifecycle, payments and events

pub mod catalog;
pub mod entitlement;
pub mod foundation;
pub mod subscription;
