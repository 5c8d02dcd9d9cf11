//! PostgreSQL implementation of SubscriptionRepository and PaymentLedger.
//!
//! Optimistic locking uses the `version` column: an update only lands when
//! the stored version matches the one the caller read. The subscription
//! update and its ledger entry share one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::catalog::{BillingCycle, Tier};
use crate::domain::foundation::{
    ClinicId, DomainError, ErrorCode, Money, PaymentId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{
    GatewayPaymentId, LifecycleState, PaymentMethodRef, PaymentRecord, PaymentStatus,
    Subscription, SubscriptionStatus,
};
use crate::ports::{PaymentLedger, SubscriptionChange, SubscriptionRepository};

const LIVE_CLINIC_CONSTRAINT: &str = "subscriptions_live_clinic_key";
const GATEWAY_PAID_CONSTRAINT: &str = "subscription_payments_gateway_paid_key";

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, clinic_id, status, manual_tier_selected, state_changed_at, tier,
    has_intelligence, billing_cycle, current_period_start, current_period_end,
    price_amount_minor, price_currency, auto_pay_enabled, cancel_at_period_end,
    payment_method_token, grace_period_days, renewal_attempts, version,
    created_at, updated_at, billing_anchor_day
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, subscription_id, amount_minor, currency, status, gateway_payment_id,
    method, paid_at, created_at, description, failure_reason
"#;

/// PostgreSQL-backed subscription store.
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    clinic_id: Uuid,
    status: String,
    manual_tier_selected: bool,
    state_changed_at: Option<DateTime<Utc>>,
    tier: String,
    has_intelligence: bool,
    billing_cycle: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    billing_anchor_day: i32,
    price_amount_minor: Option<i64>,
    price_currency: Option<String>,
    auto_pay_enabled: bool,
    cancel_at_period_end: bool,
    payment_method_token: Option<String>,
    grace_period_days: i32,
    renewal_attempts: i32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(field: &str, detail: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", field, detail),
    )
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|e| corrupt("status", e))?;
        let tier: Tier = row.tier.parse().map_err(|e| corrupt("tier", e))?;
        let billing_cycle: BillingCycle = row
            .billing_cycle
            .parse()
            .map_err(|e| corrupt("billing_cycle", e))?;
        let state_changed_at = row
            .state_changed_at
            .map(Timestamp::from_datetime)
            .unwrap_or_else(|| Timestamp::from_datetime(row.updated_at));

        let price_at_snapshot = match (row.price_amount_minor, row.price_currency) {
            (Some(amount), Some(currency)) => {
                Some(Money::new(amount, currency).map_err(|e| corrupt("price", e))?)
            }
            _ => None,
        };
        let payment_method = row
            .payment_method_token
            .map(PaymentMethodRef::new)
            .transpose()
            .map_err(|e| corrupt("payment_method_token", e))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            clinic_id: ClinicId::from_uuid(row.clinic_id),
            state: LifecycleState::from_parts(status, row.manual_tier_selected, state_changed_at),
            tier,
            has_intelligence: row.has_intelligence,
            billing_cycle,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            billing_anchor_day: u32::try_from(row.billing_anchor_day)
                .map_err(|e| corrupt("billing_anchor_day", e))?,
            price_at_snapshot,
            auto_pay_enabled: row.auto_pay_enabled,
            cancel_at_period_end: row.cancel_at_period_end,
            payment_method,
            grace_period_days: u32::try_from(row.grace_period_days)
                .map_err(|e| corrupt("grace_period_days", e))?,
            renewal_attempts: u32::try_from(row.renewal_attempts)
                .map_err(|e| corrupt("renewal_attempts", e))?,
            version: u64::try_from(row.version).map_err(|e| corrupt("version", e))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Database row representation of a ledger entry.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    subscription_id: Uuid,
    amount_minor: i64,
    currency: String,
    status: String,
    gateway_payment_id: Option<String>,
    method: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    description: Option<String>,
    failure_reason: Option<String>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentRecord {
            id: PaymentId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            amount: Money::new(row.amount_minor, row.currency).map_err(|e| corrupt("amount", e))?,
            status: row.status.parse::<PaymentStatus>().map_err(|e| corrupt("status", e))?,
            gateway_payment_id: row
                .gateway_payment_id
                .map(GatewayPaymentId::new)
                .transpose()
                .map_err(|e| corrupt("gateway_payment_id", e))?,
            method: row.method,
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            description: row.description,
            failure_reason: row.failure_reason,
        })
    }
}

fn manual_tier_selected(state: &LifecycleState) -> bool {
    matches!(
        state,
        LifecycleState::Trialing {
            manual_tier_selected: true
        }
    )
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

fn violates(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

fn to_i32(value: u32, field: &str) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|_| DomainError::validation(field, format!("{} is out of range", field)))
}

fn to_i64(value: u64, field: &str) -> Result<i64, DomainError> {
    i64::try_from(value).map_err(|_| DomainError::validation(field, format!("{} is out of range", field)))
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &PaymentRecord,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO subscription_payments (
            id, subscription_id, amount_minor, currency, status, gateway_payment_id,
            method, paid_at, created_at, description, failure_reason
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.subscription_id.as_uuid())
    .bind(payment.amount.amount_minor())
    .bind(payment.amount.currency())
    .bind(payment.status.as_str())
    .bind(payment.gateway_payment_id.as_ref().map(GatewayPaymentId::as_str))
    .bind(&payment.method)
    .bind(payment.paid_at.as_ref().map(Timestamp::as_datetime))
    .bind(payment.created_at.as_datetime())
    .bind(&payment.description)
    .bind(&payment.failure_reason)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if violates(&e, GATEWAY_PAID_CONSTRAINT) {
            let gateway_id = payment
                .gateway_payment_id
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default();
            return DomainError::new(
                ErrorCode::DuplicatePayment,
                format!("payment {} already recorded", gateway_id),
            )
            .with_detail("gateway_payment_id", gateway_id);
        }
        db_error("record payment", e)
    })?;
    Ok(())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let price = subscription.price_at_snapshot.as_ref();
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, clinic_id, status, manual_tier_selected, state_changed_at, tier,
                has_intelligence, billing_cycle, current_period_start, current_period_end,
                price_amount_minor, price_currency, auto_pay_enabled, cancel_at_period_end,
                payment_method_token, grace_period_days, renewal_attempts, version,
                created_at, updated_at, billing_anchor_day
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.clinic_id.as_uuid())
        .bind(subscription.status().as_str())
        .bind(manual_tier_selected(&subscription.state))
        .bind(subscription.state.entered_at().as_ref().map(Timestamp::as_datetime))
        .bind(subscription.tier.as_str())
        .bind(subscription.has_intelligence)
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(price.map(Money::amount_minor))
        .bind(price.map(Money::currency))
        .bind(subscription.auto_pay_enabled)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.payment_method.as_ref().map(PaymentMethodRef::as_str))
        .bind(to_i32(subscription.grace_period_days, "grace_period_days")?)
        .bind(to_i32(subscription.renewal_attempts, "renewal_attempts")?)
        .bind(to_i64(subscription.version, "version")?)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(to_i32(subscription.billing_anchor_day, "billing_anchor_day")?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, LIVE_CLINIC_CONSTRAINT) {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    format!("clinic {} already has a live subscription", subscription.clinic_id),
                );
            }
            db_error("insert subscription", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let query = format!("SELECT {} FROM subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS);
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_current_for_clinic(
        &self,
        clinic_id: &ClinicId,
    ) -> Result<Option<Subscription>, DomainError> {
        // The live record if there is one, else the most recent cancelled one
        let query = format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE clinic_id = $1
            ORDER BY (status <> 'CANCELLED') DESC, created_at DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(clinic_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_due(&self, now: Timestamp, limit: u32) -> Result<Vec<Subscription>, DomainError> {
        let query = format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE (status IN ('TRIALING', 'ACTIVE') AND current_period_end <= $1)
               OR (status = 'GRACE' AND (
                       cancel_at_period_end
                       OR state_changed_at + grace_period_days * INTERVAL '1 day' <= $1))
            ORDER BY CASE
                WHEN status = 'GRACE' THEN state_changed_at + grace_period_days * INTERVAL '1 day'
                ELSE current_period_end
            END
            LIMIT $2
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&query)
            .bind(now.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("load due subscriptions", e))?;

        let subscriptions = rows
            .into_iter()
            .map(Subscription::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subscriptions
            .into_iter()
            .filter(|sub| sub.due_action(now).is_some())
            .collect())
    }

    async fn commit(&self, change: SubscriptionChange) -> Result<u64, DomainError> {
        let subscription = &change.subscription;
        let expected = to_i64(change.expected_version, "expected_version")?;
        let price = subscription.price_at_snapshot.as_ref();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = $3,
                manual_tier_selected = $4,
                state_changed_at = $5,
                tier = $6,
                has_intelligence = $7,
                billing_cycle = $8,
                current_period_start = $9,
                current_period_end = $10,
                price_amount_minor = $11,
                price_currency = $12,
                auto_pay_enabled = $13,
                cancel_at_period_end = $14,
                payment_method_token = $15,
                grace_period_days = $16,
                renewal_attempts = $17,
                updated_at = $18,
                billing_anchor_day = $19,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(expected)
        .bind(subscription.status().as_str())
        .bind(manual_tier_selected(&subscription.state))
        .bind(subscription.state.entered_at().as_ref().map(Timestamp::as_datetime))
        .bind(subscription.tier.as_str())
        .bind(subscription.has_intelligence)
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(price.map(Money::amount_minor))
        .bind(price.map(Money::currency))
        .bind(subscription.auto_pay_enabled)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.payment_method.as_ref().map(PaymentMethodRef::as_str))
        .bind(to_i32(subscription.grace_period_days, "grace_period_days")?)
        .bind(to_i32(subscription.renewal_attempts, "renewal_attempts")?)
        .bind(subscription.updated_at.as_datetime())
        .bind(to_i32(subscription.billing_anchor_day, "billing_anchor_day")?)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if violates(&e, LIVE_CLINIC_CONSTRAINT) {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    format!("clinic {} already has a live subscription", subscription.clinic_id),
                );
            }
            db_error("update subscription", e)
        })?;

        let Some((version,)) = updated else {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM subscriptions WHERE id = $1")
                    .bind(subscription.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("check subscription version", e))?;
            return Err(match exists {
                Some(_) => DomainError::new(
                    ErrorCode::ConcurrencyConflict,
                    format!("subscription {} was modified concurrently", subscription.id),
                ),
                None => DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("subscription {} not found", subscription.id),
                ),
            });
        };

        if let Some(payment) = &change.payment {
            insert_payment(&mut tx, payment).await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit transaction", e))?;

        u64::try_from(version).map_err(|e| corrupt("version", e))
    }
}

#[async_trait]
impl PaymentLedger for PostgresSubscriptionStore {
    async fn find_paid_by_gateway_id(
        &self,
        gateway_payment_id: &GatewayPaymentId,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        let query = format!(
            "SELECT {} FROM subscription_payments WHERE gateway_payment_id = $1 AND status = 'paid'",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&query)
            .bind(gateway_payment_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find payment", e))?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn list_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<PaymentRecord>, DomainError> {
        let query = format!(
            "SELECT {} FROM subscription_payments WHERE subscription_id = $1 ORDER BY created_at, id",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&query)
            .bind(subscription_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list payments", e))?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn append(&self, payment: &PaymentRecord) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;
        insert_payment(&mut tx, payment).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("commit transaction", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            status: "GRACE".to_string(),
            manual_tier_selected: false,
            state_changed_at: Some(now),
            tier: "PLUS".to_string(),
            has_intelligence: true,
            billing_cycle: "MONTHLY".to_string(),
            current_period_start: now,
            current_period_end: now,
            billing_anchor_day: 5,
            price_amount_minor: Some(249_900),
            price_currency: Some("INR".to_string()),
            auto_pay_enabled: true,
            cancel_at_period_end: false,
            payment_method_token: Some("token_1".to_string()),
            grace_period_days: 7,
            renewal_attempts: 1,
            version: 4,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_subscription() {
        let row = row();
        let grace_started = row.state_changed_at;

        let sub = Subscription::try_from(row).unwrap();

        assert_eq!(sub.status(), SubscriptionStatus::Grace);
        assert_eq!(
            sub.grace_started_at().map(|t| *t.as_datetime()),
            grace_started
        );
        assert_eq!(sub.tier, Tier::Plus);
        assert_eq!(sub.price_at_snapshot.map(|p| p.amount_minor()), Some(249_900));
        assert_eq!(sub.version, 4);
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let mut row = row();
        row.status = "PAST_DUE".to_string();

        let err = Subscription::try_from(row).unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn negative_counters_are_rejected() {
        let mut row = row();
        row.renewal_attempts = -1;

        assert!(Subscription::try_from(row).is_err());
    }

    #[test]
    fn anchor_day_survives_row_conversion() {
        let mut row = row();
        row.billing_anchor_day = 31;
        assert_eq!(Subscription::try_from(row).unwrap().billing_anchor_day, 31);

        let mut row = self::row();
        row.billing_anchor_day = -3;
        assert!(Subscription::try_from(row).is_err());
    }

    #[test]
    fn payment_row_converts() {
        let record = PaymentRecord::try_from(PaymentRow {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            amount_minor: 99_900,
            currency: "INR".to_string(),
            status: "failed".to_string(),
            gateway_payment_id: None,
            method: "razorpay".to_string(),
            paid_at: None,
            created_at: Utc::now(),
            description: None,
            failure_reason: Some("card declined".to_string()),
        })
        .unwrap();

        assert_eq!(record.status, PaymentStatus::Failed);
        assert!(!record.is_paid());
    }
}
