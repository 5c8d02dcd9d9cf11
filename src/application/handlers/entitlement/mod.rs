//! Entitlement handlers.
//!
//! Read paths resolve access from the clinic's subscription and overrides
//! on every call. Nothing is cached, so a committed payment or override is
//! visible to the next check.

mod check_feature_access;
mod get_entitlements;
mod get_pricing_table;
mod set_feature_override;

pub use check_feature_access::{CheckFeatureAccessHandler, CheckFeatureAccessQuery};
pub use get_entitlements::{EntitlementsView, GetEntitlementsHandler, GetEntitlementsQuery};
pub use get_pricing_table::{GetPricingTableHandler, PricingTable, PricingTableRow};
pub use set_feature_override::{SetFeatureOverrideCommand, SetFeatureOverrideHandler};

use crate::domain::entitlement::TenantEntitlementState;
use crate::domain::foundation::{ClinicId, DomainError};
use crate::domain::subscription::Subscription;
use crate::ports::{OverrideRepository, SubscriptionRepository};

/// Current subscription (if any) and the entitlement state derived from it.
pub(crate) async fn load_tenant_state(
    subscriptions: &dyn SubscriptionRepository,
    overrides: &dyn OverrideRepository,
    clinic_id: &ClinicId,
) -> Result<(Option<Subscription>, TenantEntitlementState), DomainError> {
    let subscription = subscriptions.find_current_for_clinic(clinic_id).await?;
    let feature_overrides = overrides.overrides_for(clinic_id).await?;
    let state = TenantEntitlementState::from_subscription(subscription.as_ref(), feature_overrides);
    Ok((subscription, state))
}
