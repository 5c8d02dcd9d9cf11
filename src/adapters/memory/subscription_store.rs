//! In-memory subscription store.
//!
//! Same version and idempotency semantics as the Postgres store, behind one
//! tokio mutex so every commit is atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::foundation::{ClinicId, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{
    GatewayPaymentId, PaymentRecord, Subscription, SubscriptionStatus,
};
use crate::ports::{PaymentLedger, SubscriptionChange, SubscriptionRepository};

#[derive(Default)]
struct State {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    payments: Vec<PaymentRecord>,
    injected_conflicts: u32,
}

/// Subscription repository and payment ledger held in memory.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    state: Mutex<State>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with `ConcurrencyConflict`, as if
    /// another writer got there first.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.lock().await.injected_conflicts = count;
    }

    /// Every ledger entry, in insertion order.
    pub async fn all_payments(&self) -> Vec<PaymentRecord> {
        self.state.lock().await.payments.clone()
    }

    /// Overwrites a stored subscription without a version check.
    pub async fn put(&self, subscription: Subscription) {
        self.state
            .lock()
            .await
            .subscriptions
            .insert(subscription.id, subscription);
    }
}

fn conflict(id: &SubscriptionId) -> DomainError {
    DomainError::new(
        ErrorCode::ConcurrencyConflict,
        format!("subscription {} was modified concurrently", id),
    )
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        let live = state.subscriptions.values().any(|existing| {
            existing.clinic_id == subscription.clinic_id
                && existing.status() != SubscriptionStatus::Cancelled
        });
        if live {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                format!("clinic {} already has a live subscription", subscription.clinic_id),
            ));
        }
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.state.lock().await.subscriptions.get(id).cloned())
    }

    async fn find_current_for_clinic(
        &self,
        clinic_id: &ClinicId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.clinic_id == *clinic_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_due(&self, now: Timestamp, limit: u32) -> Result<Vec<Subscription>, DomainError> {
        let state = self.state.lock().await;
        let mut due: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.due_action(now).is_some())
            .cloned()
            .collect();
        due.sort_by_key(|s| s.grace_deadline().unwrap_or(s.current_period_end));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn commit(&self, change: SubscriptionChange) -> Result<u64, DomainError> {
        let mut state = self.state.lock().await;
        let id = change.subscription.id;

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Err(conflict(&id));
        }

        let stored_version = match state.subscriptions.get(&id) {
            Some(stored) => stored.version,
            None => {
                return Err(DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("subscription {} not found", id),
                ))
            }
        };
        if stored_version != change.expected_version {
            return Err(conflict(&id));
        }

        if let Some(payment) = &change.payment {
            if let (true, Some(gateway_id)) = (payment.is_paid(), &payment.gateway_payment_id) {
                let duplicate = state.payments.iter().any(|p| {
                    p.is_paid() && p.gateway_payment_id.as_ref() == Some(gateway_id)
                });
                if duplicate {
                    return Err(DomainError::new(
                        ErrorCode::DuplicatePayment,
                        format!("payment {} already recorded", gateway_id),
                    )
                    .with_detail("gateway_payment_id", gateway_id.as_str()));
                }
            }
        }

        let mut subscription = change.subscription;
        subscription.version = change.expected_version + 1;
        let version = subscription.version;
        if let Some(payment) = change.payment {
            state.payments.push(payment);
        }
        state.subscriptions.insert(id, subscription);
        Ok(version)
    }
}

#[async_trait]
impl PaymentLedger for InMemorySubscriptionStore {
    async fn find_paid_by_gateway_id(
        &self,
        gateway_payment_id: &GatewayPaymentId,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.is_paid() && p.gateway_payment_id.as_ref() == Some(gateway_payment_id))
            .cloned())
    }

    async fn list_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<PaymentRecord>, DomainError> {
        let state = self.state.lock().await;
        let mut payments: Vec<PaymentRecord> = state
            .payments
            .iter()
            .filter(|p| p.subscription_id == *subscription_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn append(&self, payment: &PaymentRecord) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        if !state.subscriptions.contains_key(&payment.subscription_id) {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", payment.subscription_id),
            ));
        }
        state.payments.push(payment.clone());
        Ok(())
    }
}
