//! GetPricingTableHandler - Tiers with prices, limits and unlocked features.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::catalog::{BillingCycle, Catalog, Feature, Pricing, Tier, TierLimits};
use crate::domain::foundation::Money;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingTableRow {
    pub tier: Tier,
    pub display_name: String,
    pub pricing: Pricing,
    /// `None` for custom pricing.
    pub monthly: Option<Money>,
    pub yearly: Option<Money>,
    pub limits: TierLimits,
    pub features: Vec<Feature>,
    pub is_addon: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingTable {
    pub currency: String,
    pub tiers: Vec<PricingTableRow>,
}

pub struct GetPricingTableHandler {
    catalog: Arc<Catalog>,
}

impl GetPricingTableHandler {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn handle(&self) -> PricingTable {
        let tiers = &self.catalog.tiers;
        let rows = tiers
            .definitions()
            .iter()
            .map(|definition| PricingTableRow {
                tier: definition.tier,
                display_name: definition.display_name.clone(),
                pricing: definition.pricing,
                monthly: tiers.list_price(definition.tier, BillingCycle::Monthly),
                yearly: tiers.list_price(definition.tier, BillingCycle::Yearly),
                limits: definition.limits,
                features: self
                    .catalog
                    .features
                    .features_for_tier(definition.tier)
                    .into_iter()
                    .collect(),
                is_addon: definition.tier.is_addon(),
            })
            .collect();

        PricingTable {
            currency: tiers.currency().to_string(),
            tiers: rows,
        }
    }
}
