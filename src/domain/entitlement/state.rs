//! Per-tenant input to the entitlement resolver.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::catalog::{Feature, Tier};
use crate::domain::subscription::Subscription;

/// Snapshot of what a clinic is entitled to.
///
/// Derived from the clinic's subscription record and its overrides; never
/// stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantEntitlementState {
    /// Always a ladder tier.
    pub current_tier: Tier,
    pub has_intelligence: bool,
    /// Absolute per-feature decisions that bypass tier checks.
    pub feature_overrides: BTreeMap<Feature, bool>,
}

impl TenantEntitlementState {
    /// Entry-tier state with no add-on.
    pub fn baseline(feature_overrides: BTreeMap<Feature, bool>) -> Self {
        Self {
            current_tier: Tier::Capture,
            has_intelligence: false,
            feature_overrides,
        }
    }

    /// Derives the state from the clinic's subscription.
    ///
    /// Trialing, active and grace clinics keep their tier and add-on.
    /// Suspended, cancelled and unsubscribed clinics drop to the entry tier.
    /// Overrides apply in every case.
    pub fn from_subscription(
        subscription: Option<&Subscription>,
        feature_overrides: BTreeMap<Feature, bool>,
    ) -> Self {
        match subscription {
            Some(sub) if sub.status().grants_paid_access() => Self {
                current_tier: sub.tier,
                has_intelligence: sub.has_intelligence,
                feature_overrides,
            },
            _ => Self::baseline(feature_overrides),
        }
    }
}
