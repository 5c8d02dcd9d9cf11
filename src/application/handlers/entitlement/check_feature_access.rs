//! CheckFeatureAccessHandler - Can this clinic use this feature right now?

use std::sync::Arc;

use crate::domain::catalog::{Catalog, Feature};
use crate::domain::entitlement::{AccessDecision, EntitlementResolver};
use crate::domain::foundation::{ClinicId, DomainError};
use crate::ports::{OverrideRepository, SubscriptionRepository};

use super::load_tenant_state;

#[derive(Debug, Clone, Copy)]
pub struct CheckFeatureAccessQuery {
    pub clinic_id: ClinicId,
    pub feature: Feature,
}

pub struct CheckFeatureAccessHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    overrides: Arc<dyn OverrideRepository>,
    catalog: Arc<Catalog>,
}

impl CheckFeatureAccessHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        overrides: Arc<dyn OverrideRepository>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            subscriptions,
            overrides,
            catalog,
        }
    }

    pub async fn handle(&self, query: CheckFeatureAccessQuery) -> Result<AccessDecision, DomainError> {
        let (_, state) = load_tenant_state(
            self.subscriptions.as_ref(),
            self.overrides.as_ref(),
            &query.clinic_id,
        )
        .await?;

        let decision = EntitlementResolver::new(&self.catalog.features).decide(&state, query.feature);
        tracing::debug!(
            clinic_id = %query.clinic_id,
            feature = %query.feature,
            tier = %state.current_tier,
            allowed = decision.is_allowed(),
            "entitlement check"
        );
        Ok(decision)
    }
}
