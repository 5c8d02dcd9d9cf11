//! Subscription repository port.
//!
//! Defines the contract for persisting Subscription aggregates and the
//! payment ledger that drives them.
//!
//! # Design
//!
//! - **Optimistic locking**: every write names the version it was read at
//! - **Atomic change**: a payment and the subscription update it causes
//!   commit together or not at all
//! - **Payment idempotency**: at most one `paid` entry per gateway payment id
//!
//! # Example
//!
//! ```ignore
//! let mut sub = repo.find_by_id(&id).await?.ok_or(...)?;
//! let expected_version = sub.version;
//! sub.apply(LifecycleEvent::RenewalCharged, now)?;
//! repo.commit(SubscriptionChange::new(sub, expected_version)).await?;
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{ClinicId, DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::{GatewayPaymentId, PaymentRecord, Subscription};

/// A subscription write, optionally with the ledger entry that caused it.
#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    pub subscription: Subscription,
    /// Version the subscription was loaded at.
    pub expected_version: u64,
    pub payment: Option<PaymentRecord>,
}

impl SubscriptionChange {
    pub fn new(subscription: Subscription, expected_version: u64) -> Self {
        Self {
            subscription,
            expected_version,
            payment: None,
        }
    }

    pub fn with_payment(mut self, payment: PaymentRecord) -> Self {
        self.payment = Some(payment);
        self
    }
}

/// Repository port for Subscription aggregate persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Store a newly provisioned subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionExists` if the clinic already has a non-cancelled record
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// The clinic's most recent record, cancelled or not.
    async fn find_current_for_clinic(
        &self,
        clinic_id: &ClinicId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Subscriptions with a period end or grace deadline at or before `now`,
    /// oldest deadline first.
    async fn find_due(&self, now: Timestamp, limit: u32) -> Result<Vec<Subscription>, DomainError>;

    /// Write the change atomically and return the new version.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the stored version is not `expected_version`
    /// - `DuplicatePayment` if the payment is `paid` and its gateway id is
    ///   already recorded as `paid` (detail `gateway_payment_id`)
    /// - `SubscriptionNotFound` if the subscription does not exist
    async fn commit(&self, change: SubscriptionChange) -> Result<u64, DomainError>;
}

/// Read side of the payment ledger, plus appends that change no state.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// The `paid` entry for a gateway payment id, if any.
    async fn find_paid_by_gateway_id(
        &self,
        gateway_payment_id: &GatewayPaymentId,
    ) -> Result<Option<PaymentRecord>, DomainError>;

    /// All entries for a subscription, ordered by `created_at`.
    async fn list_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<PaymentRecord>, DomainError>;

    /// Append an entry that does not change the subscription, such as a
    /// failed attempt reported by webhook.
    async fn append(&self, payment: &PaymentRecord) -> Result<(), DomainError>;
}
