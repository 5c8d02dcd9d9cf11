//! PostgreSQL implementation of UsageReader.
//!
//! Reads the `clinic_usage` table maintained by the clinic records service.
//! A clinic with no row has no recorded usage.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::catalog::TenantUsage;
use crate::domain::foundation::{ClinicId, DomainError, ErrorCode};
use crate::ports::UsageReader;

pub struct PostgresUsageReader {
    pool: PgPool,
}

impl PostgresUsageReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    patients: i32,
    doctors: i32,
    storage_bytes: i64,
    branches: i32,
}

fn non_negative<T, U: TryFrom<T>>(value: T, field: &str) -> Result<U, DomainError> {
    U::try_from(value).map_err(|_| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid {} value in clinic_usage", field),
        )
    })
}

#[async_trait]
impl UsageReader for PostgresUsageReader {
    async fn usage_for(&self, clinic_id: &ClinicId) -> Result<TenantUsage, DomainError> {
        let row: Option<UsageRow> = sqlx::query_as(
            "SELECT patients, doctors, storage_bytes, branches FROM clinic_usage WHERE clinic_id = $1",
        )
        .bind(clinic_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to read usage: {}", e)))?;

        let Some(row) = row else {
            return Ok(TenantUsage::default());
        };
        Ok(TenantUsage {
            patients: non_negative(row.patients, "patients")?,
            doctors: non_negative(row.doctors, "doctors")?,
            storage_bytes: non_negative(row.storage_bytes, "storage_bytes")?,
            branches: non_negative(row.branches, "branches")?,
        })
    }
}
