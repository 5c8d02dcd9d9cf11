//! Tier definitions.
//!
//! Five ladder tiers ordered `Capture < Core < Plus < Pro < Enterprise`,
//! plus the `Intelligence` add-on which sits outside the ladder.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::CatalogError;

/// Subscription tier.
///
/// Deliberately not `PartialOrd`: ordering only exists between ladder
/// tiers and goes through [`Tier::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Entry tier for digitising paper records.
    Capture,
    /// Single-doctor practice essentials.
    Core,
    Plus,
    Pro,
    /// Negotiated pricing, no usage caps.
    Enterprise,
    /// AI add-on, held independently of the ladder tier.
    Intelligence,
}

impl Tier {
    /// Ladder tiers in ascending order.
    pub const LADDER: [Tier; 5] = [
        Tier::Capture,
        Tier::Core,
        Tier::Plus,
        Tier::Pro,
        Tier::Enterprise,
    ];

    /// Every catalog entry, ladder first.
    pub const ALL: [Tier; 6] = [
        Tier::Capture,
        Tier::Core,
        Tier::Plus,
        Tier::Pro,
        Tier::Enterprise,
        Tier::Intelligence,
    ];

    /// Returns true for the add-on.
    pub fn is_addon(&self) -> bool {
        matches!(self, Tier::Intelligence)
    }

    /// Position on the ladder. `None` for the add-on.
    pub fn ladder_rank(&self) -> Option<u8> {
        match self {
            Tier::Capture => Some(0),
            Tier::Core => Some(1),
            Tier::Plus => Some(2),
            Tier::Pro => Some(3),
            Tier::Enterprise => Some(4),
            Tier::Intelligence => None,
        }
    }

    /// Compares two ladder tiers.
    ///
    /// Fails with `IncomparableTiers` when either side is the add-on.
    pub fn compare(&self, other: &Tier) -> Result<Ordering, CatalogError> {
        match (self.ladder_rank(), other.ladder_rank()) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => Err(CatalogError::IncomparableTiers {
                left: *self,
                right: *other,
            }),
        }
    }

    /// The next tier up the ladder, `None` at `Enterprise` and for the add-on.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Capture => Some(Tier::Core),
            Tier::Core => Some(Tier::Plus),
            Tier::Plus => Some(Tier::Pro),
            Tier::Pro => Some(Tier::Enterprise),
            Tier::Enterprise | Tier::Intelligence => None,
        }
    }

    /// Wire identifier, e.g. `"PLUS"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Capture => "CAPTURE",
            Tier::Core => "CORE",
            Tier::Plus => "PLUS",
            Tier::Pro => "PRO",
            Tier::Enterprise => "ENTERPRISE",
            Tier::Intelligence => "INTELLIGENCE",
        }
    }

    /// Default display name used by the built-in catalog.
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Capture => "Capture",
            Tier::Core => "Core",
            Tier::Plus => "Plus",
            Tier::Pro => "Pro",
            Tier::Enterprise => "Enterprise",
            Tier::Intelligence => "Intelligence Add-on",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CatalogError::UnknownTier(s.to_string()))
    }
}
