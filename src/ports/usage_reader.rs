//! Usage reader port.
//!
//! Current resource usage of a clinic, owned by the clinical modules. Read
//! when validating downgrades.

use async_trait::async_trait;

use crate::domain::catalog::TenantUsage;
use crate::domain::foundation::{ClinicId, DomainError};

#[async_trait]
pub trait UsageReader: Send + Sync {
    async fn usage_for(&self, clinic_id: &ClinicId) -> Result<TenantUsage, DomainError>;
}
