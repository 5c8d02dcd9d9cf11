//! PostgreSQL implementation of OverrideRepository.

use async_trait::async_trait;
use std::collections::BTreeMap;

use sqlx::PgPool;

use crate::domain::catalog::Feature;
use crate::domain::foundation::{ClinicId, DomainError, ErrorCode};
use crate::ports::OverrideRepository;

pub struct PostgresOverrideStore {
    pool: PgPool,
}

impl PostgresOverrideStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl OverrideRepository for PostgresOverrideStore {
    async fn overrides_for(&self, clinic_id: &ClinicId) -> Result<BTreeMap<Feature, bool>, DomainError> {
        let rows: Vec<(String, bool)> =
            sqlx::query_as("SELECT feature, enabled FROM entitlement_overrides WHERE clinic_id = $1")
                .bind(clinic_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("load overrides", e))?;

        let mut overrides = BTreeMap::new();
        for (feature, enabled) in rows {
            match feature.parse::<Feature>() {
                Ok(feature) => {
                    overrides.insert(feature, enabled);
                }
                // Rows for retired features stay in the table but no longer apply
                Err(err) => tracing::warn!(clinic_id = %clinic_id, error = %err, "skipping override"),
            }
        }
        Ok(overrides)
    }

    async fn set(
        &self,
        clinic_id: &ClinicId,
        feature: Feature,
        enabled: Option<bool>,
    ) -> Result<(), DomainError> {
        match enabled {
            Some(enabled) => {
                sqlx::query(
                    r#"
                    INSERT INTO entitlement_overrides (clinic_id, feature, enabled, updated_at)
                    VALUES ($1, $2, $3, NOW())
                    ON CONFLICT (clinic_id, feature)
                    DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = NOW()
                    "#,
                )
                .bind(clinic_id.as_uuid())
                .bind(feature.as_str())
                .bind(enabled)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("save override", e))?;
            }
            None => {
                sqlx::query("DELETE FROM entitlement_overrides WHERE clinic_id = $1 AND feature = $2")
                    .bind(clinic_id.as_uuid())
                    .bind(feature.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_error("remove override", e))?;
            }
        }
        Ok(())
    }

    async fn clear(&self, clinic_id: &ClinicId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM entitlement_overrides WHERE clinic_id = $1")
            .bind(clinic_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("clear overrides", e))?;
        Ok(())
    }
}
