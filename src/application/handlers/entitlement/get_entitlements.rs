//! GetEntitlementsHandler - Every feature with its decision, for rendering
//! locked menu items and upgrade prompts.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::catalog::{Catalog, Tier};
use crate::domain::entitlement::{AccessDecision, EntitlementResolver};
use crate::domain::foundation::{ClinicId, DomainError};
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::{OverrideRepository, SubscriptionRepository};

use super::load_tenant_state;

#[derive(Debug, Clone, Copy)]
pub struct GetEntitlementsQuery {
    pub clinic_id: ClinicId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementsView {
    pub clinic_id: ClinicId,
    /// `None` for a clinic that was never provisioned.
    pub status: Option<SubscriptionStatus>,
    /// Effective tier, after suspension fallback.
    pub tier: Tier,
    pub has_intelligence: bool,
    pub features: Vec<AccessDecision>,
}

pub struct GetEntitlementsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    overrides: Arc<dyn OverrideRepository>,
    catalog: Arc<Catalog>,
}

impl GetEntitlementsHandler {
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

    pub async fn handle(&self, query: GetEntitlementsQuery) -> Result<EntitlementsView, DomainError> {
        let (subscription, state) = load_tenant_state(
            self.subscriptions.as_ref(),
            self.overrides.as_ref(),
            &query.clinic_id,
        )
        .await?;

        Ok(EntitlementsView {
            clinic_id: query.clinic_id,
            status: subscription.as_ref().map(|sub| sub.status()),
            tier: state.current_tier,
            has_intelligence: state.has_intelligence,
            features: EntitlementResolver::new(&self.catalog.features).decide_all(&state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::test_support::Fixture;
    use crate::domain::catalog::Feature;
    use crate::domain::subscription::LifecycleState;

    #[tokio::test]
    async fn lists_every_feature_for_paid_tier() {
        let fx = Fixture::new();
        let sub = fx
            .seed(|s| {
                s.tier = Tier::Plus;
                s.has_intelligence = true;
                s.state = LifecycleState::Active;
            })
            .await;
        let handler = GetEntitlementsHandler::new(fx.store.clone(), fx.overrides.clone(), fx.catalog.clone());

        let view = handler
            .handle(GetEntitlementsQuery {
                clinic_id: sub.clinic_id,
            })
            .await
            .unwrap();

        assert_eq!(view.status, Some(SubscriptionStatus::Active));
        assert_eq!(view.tier, Tier::Plus);
        assert_eq!(view.features.len(), Feature::ALL.len());
        for decision in &view.features {
            let feature = match decision {
                AccessDecision::Allowed { feature, .. } | AccessDecision::Denied { feature, .. } => *feature,
            };
            let required = fx.catalog.features.required_tier(feature);
            let expected = required.is_addon()
                || matches!(required, Tier::Capture | Tier::Core | Tier::Plus);
            assert_eq!(decision.is_allowed(), expected, "{}", feature);
        }
    }

    #[tokio::test]
    async fn unprovisioned_clinic_has_no_status() {
        let fx = Fixture::new();
        let handler = GetEntitlementsHandler::new(fx.store.clone(), fx.overrides.clone(), fx.catalog.clone());

        let view = handler
            .handle(GetEntitlementsQuery {
                clinic_id: ClinicId::new(),
            })
            .await
            .unwrap();

        assert_eq!(view.status, None);
        assert_eq!(view.tier, Tier::Capture);
        assert!(!view.has_intelligence);
    }
}
