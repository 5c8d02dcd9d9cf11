//! Tier catalog and feature map.
//!
//! Static definitions consumed by the entitlement resolver and the
//! subscription lifecycle. All validation happens when the catalog is
//! loaded; lookups after that cannot fail.

mod errors;
mod feature;
mod feature_map;
mod limits;
mod loader;
mod pricing;
mod tier;
mod tier_catalog;

pub use errors::CatalogError;
pub use feature::Feature;
pub use feature_map::FeatureMap;
pub use limits::{LimitBreach, LimitedResource, TenantUsage, TierLimits};
pub use loader::{Catalog, CatalogOverrides};
pub use pricing::{BillingCycle, Pricing};
pub use tier::Tier;
pub use tier_catalog::{TierCatalog, TierDefinition};
