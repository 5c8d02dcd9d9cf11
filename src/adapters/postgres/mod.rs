//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresSubscriptionStore` - Subscriptions (optimistic locking) and the payment ledger
//! - `PostgresOverrideStore` - Per-clinic feature overrides
//! - `PostgresUsageReader` - Clinic resource usage for downgrade checks
//!
//! Schema lives in `migrations/` and is applied with `sqlx::migrate!`.

mod override_store;
mod subscription_store;
mod usage_reader;

pub use override_store::PostgresOverrideStore;
pub use subscription_store::PostgresSubscriptionStore;
pub use usage_reader::PostgresUsageReader;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens the pool and applies pending migrations.
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to connect: {}", e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to migrate: {}", e)))?;

    Ok(pool)
}
