//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod entitlement;
pub mod subscription;

pub use entitlement::{
    CheckFeatureAccessHandler, CheckFeatureAccessQuery, EntitlementsView, GetEntitlementsHandler,
    GetEntitlementsQuery, GetPricingTableHandler, PricingTable, PricingTableRow,
    SetFeatureOverrideCommand, SetFeatureOverrideHandler,
};
pub use subscription::{
    AdvanceLifecycleCommand, AdvanceLifecycleHandler, AttachPaymentMethodCommand,
    AttachPaymentMethodHandler, CancelSubscriptionCommand, CancelSubscriptionHandler,
    ChangeTierCommand, ChangeTierHandler, ChangeTierResult, DeactivateClinicCommand,
    DeactivateClinicHandler, GatewayWebhookEvent, GetSubscriptionHandler, GetSubscriptionQuery,
    HandleGatewayWebhookHandler, LifecycleOutcome, ListPaymentsHandler, ListPaymentsQuery,
    PaymentOutcome, ProcessPaymentCommand, ProcessPaymentHandler, ProcessPaymentResult,
    ProvisionSubscriptionCommand, ProvisionSubscriptionHandler, RenewalSettings,
    ResumeSubscriptionCommand, ResumeSubscriptionHandler, SetAutoPayCommand, SetAutoPayHandler,
    SubscriptionSnapshot, SubscriptionTarget, WebhookOutcome,
};
