//! Pure entitlement decisions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::TenantEntitlementState;
use crate::domain::catalog::{Feature, FeatureMap, Tier};

/// Why a feature is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// An administrator disabled the feature for this clinic.
    OverrideDisabled,
    /// The clinic's ladder tier is below the required tier.
    TierTooLow,
    /// The feature belongs to the Intelligence add-on.
    AddonRequired,
}

/// Outcome of an entitlement check.
///
/// Denials always carry the tier that would unlock the feature, so callers
/// can render an upgrade prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed {
        feature: Feature,
        via_override: bool,
    },
    Denied {
        feature: Feature,
        required_tier: Tier,
        reason: DenialReason,
    },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed { .. })
    }
}

/// Combines tenant state with the feature map.
///
/// Holds no state of its own; every method is a pure function of its
/// arguments and safe to call concurrently on shared snapshots.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementResolver<'a> {
    features: &'a FeatureMap,
}

impl<'a> EntitlementResolver<'a> {
    pub fn new(features: &'a FeatureMap) -> Self {
        Self { features }
    }

    /// Full decision for one feature.
    ///
    /// Precedence: explicit override, then add-on membership, then ladder
    /// comparison. A state whose `current_tier` is not a ladder tier fails
    /// the comparison and is denied.
    pub fn decide(&self, state: &TenantEntitlementState, feature: Feature) -> AccessDecision {
        let required_tier = self.features.required_tier(feature);

        if let Some(&enabled) = state.feature_overrides.get(&feature) {
            return if enabled {
                AccessDecision::Allowed {
                    feature,
                    via_override: true,
                }
            } else {
                AccessDecision::Denied {
                    feature,
                    required_tier,
                    reason: DenialReason::OverrideDisabled,
                }
            };
        }

        let (allowed, reason) = if required_tier.is_addon() {
            (state.has_intelligence, DenialReason::AddonRequired)
        } else {
            let meets = matches!(
                state.current_tier.compare(&required_tier),
                Ok(Ordering::Greater | Ordering::Equal)
            );
            (meets, DenialReason::TierTooLow)
        };

        if allowed {
            AccessDecision::Allowed {
                feature,
                via_override: false,
            }
        } else {
            AccessDecision::Denied {
                feature,
                required_tier,
                reason,
            }
        }
    }

    pub fn can_access(&self, state: &TenantEntitlementState, feature: Feature) -> bool {
        self.decide(state, feature).is_allowed()
    }

    pub fn is_locked(&self, state: &TenantEntitlementState, feature: Feature) -> bool {
        !self.can_access(state, feature)
    }

    /// Raw mapping, for "Requires PRO" labels.
    pub fn required_tier(&self, feature: Feature) -> Tier {
        self.features.required_tier(feature)
    }

    /// Decision for every feature, in feature order.
    pub fn decide_all(&self, state: &TenantEntitlementState) -> Vec<AccessDecision> {
        Feature::ALL
            .into_iter()
            .map(|feature| self.decide(state, feature))
            .collect()
    }
}
