//! Catalog and feature-map errors.
//!
//! Everything here is a configuration error: raised while the catalog is
//! loaded at startup, never while serving a request.

use thiserror::Error;

use super::{Feature, Tier};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Unknown tier '{0}'")]
    UnknownTier(String),

    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("Tier {left} cannot be compared with {right}: the add-on is not on the ladder")]
    IncomparableTiers { left: Tier, right: Tier },

    #[error("Feature {0} has no required tier")]
    UnmappedFeature(Feature),

    #[error("Feature {0} is mapped more than once")]
    DuplicateMapping(Feature),

    #[error("Invalid pricing for {tier}: {reason}")]
    InvalidPricing { tier: Tier, reason: String },

    #[error("Catalog overrides could not be parsed: {0}")]
    Malformed(String),
}
