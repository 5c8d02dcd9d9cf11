//! The tier catalog: name, pricing, and limits per tier.

use serde::Serialize;
use std::cmp::Ordering;

use super::{BillingCycle, CatalogError, Pricing, Tier, TierLimits};
use crate::domain::foundation::Money;

/// Catalog entry for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierDefinition {
    pub tier: Tier,
    pub display_name: String,
    pub pricing: Pricing,
    pub limits: TierLimits,
}

/// Ordered definition of every tier and the add-on.
///
/// Always holds exactly one entry per [`Tier`], indexed by `Tier::index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierCatalog {
    currency: String,
    entries: Vec<TierDefinition>,
}

impl TierCatalog {
    /// Built-in catalog, priced in INR paise.
    ///
    /// | Tier | Monthly | Yearly |
    /// |------|---------|--------|
    /// | Capture | 499 | 4,990 |
    /// | Core | 999 | 9,990 |
    /// | Plus | 2,499 | 24,990 |
    /// | Pro | 4,999 | 49,990 |
    /// | Enterprise | custom | custom |
    /// | Intelligence | 1,499 | 14,990 |
    pub fn standard() -> Self {
        let entries = Tier::ALL
            .into_iter()
            .map(|tier| TierDefinition {
                tier,
                display_name: tier.display_name().to_string(),
                pricing: standard_pricing(tier),
                limits: TierLimits::for_tier(tier),
            })
            .collect();
        Self {
            currency: "INR".to_string(),
            entries,
        }
    }

    /// Replaces the catalog currency.
    pub fn with_currency(mut self, currency: &str) -> Result<Self, CatalogError> {
        let money = Money::new(0, currency).map_err(|e| CatalogError::Malformed(e.to_string()))?;
        self.currency = money.currency().to_string();
        Ok(self)
    }

    /// Re-prices a tier.
    ///
    /// Only `Enterprise` may carry custom pricing; fixed prices must not be
    /// negative.
    pub fn with_pricing(mut self, tier: Tier, pricing: Pricing) -> Result<Self, CatalogError> {
        match pricing {
            Pricing::Custom if tier != Tier::Enterprise => {
                return Err(CatalogError::InvalidPricing {
                    tier,
                    reason: "only ENTERPRISE may use custom pricing".to_string(),
                });
            }
            Pricing::Fixed {
                monthly_minor,
                yearly_minor,
            } if monthly_minor < 0 || yearly_minor < 0 => {
                return Err(CatalogError::InvalidPricing {
                    tier,
                    reason: "prices must not be negative".to_string(),
                });
            }
            _ => {}
        }
        self.entries[tier.index()].pricing = pricing;
        Ok(self)
    }

    /// Renames a tier for display.
    pub fn with_display_name(mut self, tier: Tier, name: impl Into<String>) -> Self {
        self.entries[tier.index()].display_name = name.into();
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn get(&self, tier: Tier) -> &TierDefinition {
        &self.entries[tier.index()]
    }

    /// Looks a tier up by its wire identifier.
    pub fn lookup(&self, name: &str) -> Result<&TierDefinition, CatalogError> {
        let tier: Tier = name.parse()?;
        Ok(self.get(tier))
    }

    /// Ladder comparison; rejects the add-on.
    pub fn compare(&self, a: Tier, b: Tier) -> Result<Ordering, CatalogError> {
        a.compare(&b)
    }

    pub fn next_tier(&self, tier: Tier) -> Option<Tier> {
        tier.next()
    }

    /// All entries, ladder first, add-on last.
    pub fn definitions(&self) -> &[TierDefinition] {
        &self.entries
    }

    /// List price of a tier for a cycle, `None` for custom pricing.
    pub fn list_price(&self, tier: Tier, cycle: BillingCycle) -> Option<Money> {
        let amount = self.get(tier).pricing.for_cycle(cycle)?;
        Money::new(amount, self.currency.as_str()).ok()
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_pricing(tier: Tier) -> Pricing {
    let monthly = match tier {
        Tier::Capture => 49_900,
        Tier::Core => 99_900,
        Tier::Plus => 249_900,
        Tier::Pro => 499_900,
        Tier::Intelligence => 149_900,
        Tier::Enterprise => return Pricing::Custom,
    };
    Pricing::Fixed {
        monthly_minor: monthly,
        yearly_minor: monthly * 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_has_one_entry_per_tier() {
        let catalog = TierCatalog::standard();
        assert_eq!(catalog.definitions().len(), Tier::ALL.len());
        for tier in Tier::ALL {
            assert_eq!(catalog.get(tier).tier, tier);
        }
    }

    #[test]
    fn enterprise_is_custom_priced() {
        let catalog = TierCatalog::standard();
        assert!(catalog.get(Tier::Enterprise).pricing.is_custom());
        assert_eq!(catalog.list_price(Tier::Enterprise, BillingCycle::Monthly), None);
    }

    #[test]
    fn plus_lists_at_2499_rupees() {
        let catalog = TierCatalog::standard();
        let price = catalog.list_price(Tier::Plus, BillingCycle::Monthly).unwrap();
        assert_eq!(price.amount_minor(), 249_900);
        assert_eq!(price.currency(), "INR");
    }

    #[test]
    fn lookup_rejects_unknown_tier() {
        let catalog = TierCatalog::standard();
        assert_eq!(
            catalog.lookup("GOLD").unwrap_err(),
            CatalogError::UnknownTier("GOLD".to_string())
        );
        assert_eq!(catalog.lookup("pro").unwrap().tier, Tier::Pro);
    }

    #[test]
    fn custom_pricing_is_reserved_for_enterprise() {
        let result = TierCatalog::standard().with_pricing(Tier::Pro, Pricing::Custom);
        assert!(matches!(
            result,
            Err(CatalogError::InvalidPricing { tier: Tier::Pro, .. })
        ));
    }

    #[test]
    fn repricing_changes_list_price() {
        let catalog = TierCatalog::standard()
            .with_pricing(
                Tier::Core,
                Pricing::Fixed {
                    monthly_minor: 119_900,
                    yearly_minor: 1_199_000,
                },
            )
            .unwrap();
        assert_eq!(
            catalog
                .list_price(Tier::Core, BillingCycle::Yearly)
                .map(|m| m.amount_minor()),
            Some(1_199_000)
        );
    }

    #[test]
    fn compare_delegates_to_ladder_order() {
        let catalog = TierCatalog::standard();
        assert_eq!(catalog.compare(Tier::Pro, Tier::Core), Ok(Ordering::Greater));
        assert!(catalog.compare(Tier::Pro, Tier::Intelligence).is_err());
        assert_eq!(catalog.next_tier(Tier::Enterprise), None);
    }
}
