//! Feature → required tier mapping.

use std::collections::BTreeSet;

use super::{CatalogError, Feature, Tier};

/// Total mapping from every [`Feature`] to the tier that unlocks it.
///
/// Construction fails unless every feature is mapped exactly once, so
/// lookups never miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMap {
    required: [Tier; Feature::COUNT],
}

impl FeatureMap {
    /// Map built from [`Feature::default_required_tier`].
    pub fn standard() -> Self {
        let mut required = [Tier::Capture; Feature::COUNT];
        for feature in Feature::ALL {
            required[feature.index()] = feature.default_required_tier();
        }
        Self { required }
    }

    /// Builds a map from explicit entries.
    ///
    /// Fails with `UnmappedFeature` if any feature is missing and with
    /// `DuplicateMapping` if one appears twice.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Feature, Tier)>,
    ) -> Result<Self, CatalogError> {
        let mut slots: [Option<Tier>; Feature::COUNT] = [None; Feature::COUNT];
        for (feature, tier) in entries {
            let slot = &mut slots[feature.index()];
            if slot.is_some() {
                return Err(CatalogError::DuplicateMapping(feature));
            }
            *slot = Some(tier);
        }

        let mut required = [Tier::Capture; Feature::COUNT];
        for feature in Feature::ALL {
            required[feature.index()] =
                slots[feature.index()].ok_or(CatalogError::UnmappedFeature(feature))?;
        }
        Ok(Self { required })
    }

    /// Returns a copy with one feature moved to a different tier.
    pub fn with_mapping(mut self, feature: Feature, tier: Tier) -> Self {
        self.required[feature.index()] = tier;
        self
    }

    /// Minimum tier (or the add-on) that unlocks `feature`.
    pub fn required_tier(&self, feature: Feature) -> Tier {
        self.required[feature.index()]
    }

    /// Features unlocked by holding `tier`.
    ///
    /// Ladder tiers are cumulative: `Pro` includes everything mapped to
    /// `Capture` through `Pro`. The add-on yields only the features mapped
    /// to it. Display only; access decisions go through the resolver.
    pub fn features_for_tier(&self, tier: Tier) -> BTreeSet<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| {
                let required = self.required_tier(*feature);
                if tier.is_addon() || required.is_addon() {
                    tier == required
                } else {
                    matches!(
                        tier.compare(&required),
                        Ok(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                    )
                }
            })
            .collect()
    }

    /// All `(feature, required tier)` pairs in feature order.
    pub fn entries(&self) -> impl Iterator<Item = (Feature, Tier)> + '_ {
        Feature::ALL
            .into_iter()
            .map(move |feature| (feature, self.required_tier(feature)))
    }
}

impl Default for FeatureMap {
    fn default() -> Self {
        Self::standard()
    }
}
