//! Tier pricing and billing cycles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

/// How often a subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Advances a period boundary by one cycle.
    pub fn advance(&self, from: Timestamp) -> Timestamp {
        from.plus_months(self.months())
    }

    /// Advances by one cycle, keeping periods on `anchor_day` across short
    /// months.
    pub fn advance_anchored(&self, from: Timestamp, anchor_day: u32) -> Timestamp {
        from.plus_months_anchored(self.months(), anchor_day)
    }

    fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Yearly => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(BillingCycle::Monthly),
            "YEARLY" => Ok(BillingCycle::Yearly),
            other => Err(ValidationError::invalid_format(
                "billing_cycle",
                format!("unknown billing cycle '{}'", other),
            )),
        }
    }
}

/// List price of a tier, in minor units of the catalog currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pricing {
    Fixed {
        monthly_minor: i64,
        yearly_minor: i64,
    },
    /// Negotiated per contract; the amount actually paid is snapshotted.
    Custom,
}

impl Pricing {
    /// List price for a cycle, `None` when pricing is custom.
    pub fn for_cycle(&self, cycle: BillingCycle) -> Option<i64> {
        match (self, cycle) {
            (Pricing::Fixed { monthly_minor, .. }, BillingCycle::Monthly) => Some(*monthly_minor),
            (Pricing::Fixed { yearly_minor, .. }, BillingCycle::Yearly) => Some(*yearly_minor),
            (Pricing::Custom, _) => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Pricing::Custom)
    }
}
