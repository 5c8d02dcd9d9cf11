//! Entitlement override port.
//!
//! Per-clinic, per-feature decisions set by support or sales that bypass
//! tier checks.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::catalog::Feature;
use crate::domain::foundation::{ClinicId, DomainError};

#[async_trait]
pub trait OverrideRepository: Send + Sync {
    /// Every override for the clinic. Empty when none are set.
    async fn overrides_for(&self, clinic_id: &ClinicId) -> Result<BTreeMap<Feature, bool>, DomainError>;

    /// Set an override, or remove it with `None`.
    async fn set(
        &self,
        clinic_id: &ClinicId,
        feature: Feature,
        enabled: Option<bool>,
    ) -> Result<(), DomainError>;

    /// Remove every override for the clinic.
    async fn clear(&self, clinic_id: &ClinicId) -> Result<(), DomainError>;
}
