//! Loaded catalog: tier catalog plus feature map, with optional overrides.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::{CatalogError, Feature, FeatureMap, Pricing, Tier, TierCatalog};

/// Deployment-specific adjustments to the built-in catalog.
///
/// ```yaml
/// currency: INR
/// pricing:
///   PLUS: { kind: fixed, monthly_minor: 279900, yearly_minor: 2799000 }
/// display_names:
///   CAPTURE: Starter
/// features:
///   MULTI_DOCTOR: PLUS
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogOverrides {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub pricing: BTreeMap<String, Pricing>,
    #[serde(default)]
    pub display_names: BTreeMap<String, String>,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
}

impl CatalogOverrides {
    pub fn from_yaml(source: &str) -> Result<Self, CatalogError> {
        serde_yaml::from_str(source).map_err(|e| CatalogError::Malformed(e.to_string()))
    }
}

/// Everything the entitlement and billing code needs to know about tiers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    pub tiers: TierCatalog,
    pub features: FeatureMap,
}

impl Catalog {
    /// Built-in tiers and feature mapping.
    pub fn standard() -> Self {
        Self {
            tiers: TierCatalog::standard(),
            features: FeatureMap::standard(),
        }
    }

    /// Applies overrides on top of the built-in catalog.
    ///
    /// Every tier and feature name is validated; the first bad name aborts
    /// the load.
    pub fn load(overrides: &CatalogOverrides) -> Result<Self, CatalogError> {
        let mut tiers = TierCatalog::standard();
        if let Some(currency) = &overrides.currency {
            tiers = tiers.with_currency(currency)?;
        }
        for (name, pricing) in &overrides.pricing {
            let tier: Tier = name.parse()?;
            tiers = tiers.with_pricing(tier, *pricing)?;
        }
        for (name, display_name) in &overrides.display_names {
            let tier: Tier = name.parse()?;
            tiers = tiers.with_display_name(tier, display_name.clone());
        }

        let mut features = FeatureMap::standard();
        for (feature_name, tier_name) in &overrides.features {
            let feature: Feature = feature_name.parse()?;
            let tier: Tier = tier_name.parse()?;
            features = features.with_mapping(feature, tier);
        }
        let features = FeatureMap::from_entries(features.entries())?;

        Ok(Self { tiers, features })
    }
}
