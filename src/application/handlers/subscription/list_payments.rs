//! ListPaymentsHandler - Payment history for the clinic's current record.

use std::sync::Arc;

use crate::domain::foundation::ClinicId;
use crate::domain::subscription::{PaymentRecord, SubscriptionError};
use crate::ports::{PaymentLedger, SubscriptionRepository};

use super::load_current;

#[derive(Debug, Clone)]
pub struct ListPaymentsQuery {
    pub clinic_id: ClinicId,
}

pub struct ListPaymentsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn PaymentLedger>,
}

impl ListPaymentsHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, ledger: Arc<dyn PaymentLedger>) -> Self {
        Self {
            subscriptions,
            ledger,
        }
    }

    /// Entries ordered by `created_at`, oldest first.
    pub async fn handle(&self, query: ListPaymentsQuery) -> Result<Vec<PaymentRecord>, SubscriptionError> {
        let subscription = load_current(self.subscriptions.as_ref(), &query.clinic_id).await?;
        Ok(self.ledger.list_for_subscription(&subscription.id).await?)
    }
}
