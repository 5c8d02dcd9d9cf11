//! In-memory entitlement overrides.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::domain::catalog::Feature;
use crate::domain::foundation::{ClinicId, DomainError};
use crate::ports::OverrideRepository;

#[derive(Default)]
pub struct InMemoryOverrideStore {
    overrides: RwLock<HashMap<ClinicId, BTreeMap<Feature, bool>>>,
}

impl InMemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverrideRepository for InMemoryOverrideStore {
    async fn overrides_for(&self, clinic_id: &ClinicId) -> Result<BTreeMap<Feature, bool>, DomainError> {
        Ok(self
            .overrides
            .read()
            .await
            .get(clinic_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set(
        &self,
        clinic_id: &ClinicId,
        feature: Feature,
        enabled: Option<bool>,
    ) -> Result<(), DomainError> {
        let mut overrides = self.overrides.write().await;
        let entry = overrides.entry(*clinic_id).or_default();
        match enabled {
            Some(enabled) => {
                entry.insert(feature, enabled);
            }
            None => {
                entry.remove(&feature);
            }
        }
        Ok(())
    }

    async fn clear(&self, clinic_id: &ClinicId) -> Result<(), DomainError> {
        self.overrides.write().await.remove(clinic_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_clear_overrides() {
        let store = InMemoryOverrideStore::new();
        let clinic_id = ClinicId::new();

        store.set(&clinic_id, Feature::FhirExport, Some(true)).await.unwrap();
        store.set(&clinic_id, Feature::Invoicing, Some(false)).await.unwrap();
        assert_eq!(store.overrides_for(&clinic_id).await.unwrap().len(), 2);

        store.set(&clinic_id, Feature::FhirExport, None).await.unwrap();
        assert_eq!(
            store.overrides_for(&clinic_id).await.unwrap(),
            BTreeMap::from([(Feature::Invoicing, false)])
        );

        store.clear(&clinic_id).await.unwrap();
        assert!(store.overrides_for(&clinic_id).await.unwrap().is_empty());
    }
}
