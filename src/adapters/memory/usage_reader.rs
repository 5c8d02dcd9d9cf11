//! Usage reader backed by a settable map.
//!
//! Clinics with no recorded usage report zero for every resource.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::catalog::TenantUsage;
use crate::domain::foundation::{ClinicId, DomainError};
use crate::ports::UsageReader;

#[derive(Default)]
pub struct InMemoryUsageReader {
    usage: RwLock<HashMap<ClinicId, TenantUsage>>,
}

impl InMemoryUsageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_usage(&self, clinic_id: ClinicId, usage: TenantUsage) {
        self.usage.write().await.insert(clinic_id, usage);
    }
}

#[async_trait]
impl UsageReader for InMemoryUsageReader {
    async fn usage_for(&self, clinic_id: &ClinicId) -> Result<TenantUsage, DomainError> {
        Ok(self
            .usage
            .read()
            .await
            .get(clinic_id)
            .cloned()
            .unwrap_or_default())
    }
}
