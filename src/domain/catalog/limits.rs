//! Per-tier usage limits.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Tier;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Usage caps for a tier. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub max_patients: Option<u32>,
    pub max_doctors: Option<u32>,
    pub storage_gb: Option<u32>,
    pub max_branches: Option<u32>,
}

/// Current resource usage of a clinic, as reported by the CRUD layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantUsage {
    pub patients: u32,
    pub doctors: u32,
    pub storage_bytes: u64,
    pub branches: u32,
}

/// A limited resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitedResource {
    Patients,
    Doctors,
    Storage,
    Branches,
}

impl fmt::Display for LimitedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LimitedResource::Patients => "patients",
            LimitedResource::Doctors => "doctors",
            LimitedResource::Storage => "storage",
            LimitedResource::Branches => "branches",
        };
        write!(f, "{}", s)
    }
}

/// One limit that current usage already exceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitBreach {
    pub resource: LimitedResource,
    pub limit: u64,
    pub current: u64,
}

impl TierLimits {
    pub const UNLIMITED: TierLimits = TierLimits {
        max_patients: None,
        max_doctors: None,
        storage_gb: None,
        max_branches: None,
    };

    /// Built-in limits.
    ///
    /// | Tier | Patients | Doctors | Storage | Branches |
    /// |------|----------|---------|---------|----------|
    /// | Capture | 100 | 1 | 1 GB | 1 |
    /// | Core | 500 | 2 | 5 GB | 1 |
    /// | Plus | 2,000 | 5 | 25 GB | 2 |
    /// | Pro | 10,000 | 15 | 100 GB | 5 |
    /// | Enterprise | Unlimited | Unlimited | Unlimited | Unlimited |
    ///
    /// The Intelligence add-on adds no caps of its own.
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Capture => Self::capped(100, 1, 1, 1),
            Tier::Core => Self::capped(500, 2, 5, 1),
            Tier::Plus => Self::capped(2_000, 5, 25, 2),
            Tier::Pro => Self::capped(10_000, 15, 100, 5),
            Tier::Enterprise | Tier::Intelligence => Self::UNLIMITED,
        }
    }

    fn capped(patients: u32, doctors: u32, storage_gb: u32, branches: u32) -> Self {
        Self {
            max_patients: Some(patients),
            max_doctors: Some(doctors),
            storage_gb: Some(storage_gb),
            max_branches: Some(branches),
        }
    }

    /// Lists every limit that `usage` is already over.
    ///
    /// Being exactly at a limit is not a breach.
    pub fn breaches(&self, usage: &TenantUsage) -> Vec<LimitBreach> {
        let checks = [
            (
                LimitedResource::Patients,
                self.max_patients.map(u64::from),
                u64::from(usage.patients),
            ),
            (
                LimitedResource::Doctors,
                self.max_doctors.map(u64::from),
                u64::from(usage.doctors),
            ),
            (
                LimitedResource::Storage,
                self.storage_gb.map(|gb| u64::from(gb) * BYTES_PER_GB),
                usage.storage_bytes,
            ),
            (
                LimitedResource::Branches,
                self.max_branches.map(u64::from),
                u64::from(usage.branches),
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(resource, limit, current)| match limit {
                Some(limit) if current > limit => Some(LimitBreach {
                    resource,
                    limit,
                    current,
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enterprise_is_unlimited() {
        let usage = TenantUsage {
            patients: u32::MAX,
            doctors: 500,
            storage_bytes: u64::MAX,
            branches: 40,
        };
        assert!(TierLimits::for_tier(Tier::Enterprise).breaches(&usage).is_empty());
    }

    #[test]
    fn usage_at_the_limit_is_not_a_breach() {
        let usage = TenantUsage {
            patients: 500,
            doctors: 2,
            storage_bytes: 5 * BYTES_PER_GB,
            branches: 1,
        };
        assert!(TierLimits::for_tier(Tier::Core).breaches(&usage).is_empty());
    }

    #[test]
    fn reports_each_exceeded_limit() {
        let usage = TenantUsage {
            patients: 600,
            doctors: 2,
            storage_bytes: 6 * BYTES_PER_GB,
            branches: 1,
        };
        let breaches = TierLimits::for_tier(Tier::Core).breaches(&usage);

        assert_eq!(breaches.len(), 2);
        assert_eq!(
            breaches[0],
            LimitBreach {
                resource: LimitedResource::Patients,
                limit: 500,
                current: 600,
            }
        );
        assert_eq!(breaches[1].resource, LimitedResource::Storage);
    }

    #[test]
    fn limits_grow_up_the_ladder() {
        let mut previous = 0;
        for tier in [Tier::Capture, Tier::Core, Tier::Plus, Tier::Pro] {
            let patients = TierLimits::for_tier(tier).max_patients.unwrap();
            assert!(patients > previous);
            previous = patients;
        }
    }
}
