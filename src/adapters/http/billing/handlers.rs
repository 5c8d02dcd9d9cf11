//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::adapters::razorpay::{RazorpayWebhookVerifier, WebhookError, SIGNATURE_HEADER};
use crate::application::handlers::entitlement::{
    CheckFeatureAccessHandler, CheckFeatureAccessQuery, GetEntitlementsHandler,
    GetEntitlementsQuery, GetPricingTableHandler, SetFeatureOverrideCommand,
    SetFeatureOverrideHandler,
};
use crate::application::handlers::subscription::{
    AttachPaymentMethodCommand, AttachPaymentMethodHandler, CancelSubscriptionCommand,
    CancelSubscriptionHandler, ChangeTierCommand, ChangeTierHandler, DeactivateClinicCommand,
    DeactivateClinicHandler, GetSubscriptionHandler, GetSubscriptionQuery,
    HandleGatewayWebhookHandler, ListPaymentsHandler, ListPaymentsQuery, PaymentOutcome,
    ProcessPaymentCommand,
    ProcessPaymentHandler, ProvisionSubscriptionCommand, ProvisionSubscriptionHandler,
    ResumeSubscriptionCommand, ResumeSubscriptionHandler, SetAutoPayCommand, SetAutoPayHandler,
    SubscriptionSnapshot, SubscriptionTarget, WebhookOutcome,
};
use crate::domain::catalog::{Catalog, CatalogError, Feature};
use crate::domain::foundation::{ClinicId, DomainError, ErrorCode};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionPolicy};
use crate::ports::{
    Clock, EventPublisher, OverrideRepository, PaymentLedger, SubscriptionRepository,
    UsageReader,
};

use super::dto::{
    AttachPaymentMethodRequest, ChangeTierRequest, ChangeTierResponse, ErrorResponse,
    FeatureAccessResponse, PaymentHistoryResponse, PaymentResponse, ProcessPaymentRequest,
    ProcessPaymentResponse, SetAutoPayRequest, SetOverrideRequest, WebhookAckResponse,
};

/// Header carrying a caller-chosen payment id for admin payments.
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub overrides: Arc<dyn OverrideRepository>,
    pub usage: Arc<dyn UsageReader>,
    pub event_publisher: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<Catalog>,
    pub policy: SubscriptionPolicy,
    /// `None` when no webhook secret is configured; the webhook route then
    /// refuses every delivery.
    pub webhook_verifier: Option<RazorpayWebhookVerifier>,
}

impl BillingAppState {
    pub fn pricing_table_handler(&self) -> GetPricingTableHandler {
        GetPricingTableHandler::new(self.catalog.clone())
    }

    pub fn provision_handler(&self) -> ProvisionSubscriptionHandler {
        ProvisionSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
            self.catalog.clone(),
            self.policy,
        )
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.subscriptions.clone(), self.clock.clone())
    }

    pub fn deactivate_handler(&self) -> DeactivateClinicHandler {
        DeactivateClinicHandler::new(
            self.subscriptions.clone(),
            self.overrides.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
        )
    }

    pub fn list_payments_handler(&self) -> ListPaymentsHandler {
        ListPaymentsHandler::new(self.subscriptions.clone(), self.ledger.clone())
    }

    pub fn process_payment_handler(&self) -> ProcessPaymentHandler {
        ProcessPaymentHandler::new(
            self.subscriptions.clone(),
            self.ledger.clone(),
            self.usage.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
            self.catalog.clone(),
        )
    }

    pub fn change_tier_handler(&self) -> ChangeTierHandler {
        ChangeTierHandler::new(
            self.subscriptions.clone(),
            self.usage.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
            self.catalog.clone(),
        )
    }

    pub fn set_auto_pay_handler(&self) -> SetAutoPayHandler {
        SetAutoPayHandler::new(
            self.subscriptions.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
        )
    }

    pub fn attach_payment_method_handler(&self) -> AttachPaymentMethodHandler {
        AttachPaymentMethodHandler::new(self.subscriptions.clone(), self.clock.clone())
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.subscriptions.clone(), self.clock.clone())
    }

    pub fn resume_handler(&self) -> ResumeSubscriptionHandler {
        ResumeSubscriptionHandler::new(self.subscriptions.clone(), self.clock.clone())
    }

    pub fn entitlements_handler(&self) -> GetEntitlementsHandler {
        GetEntitlementsHandler::new(
            self.subscriptions.clone(),
            self.overrides.clone(),
            self.catalog.clone(),
        )
    }

    pub fn check_access_handler(&self) -> CheckFeatureAccessHandler {
        CheckFeatureAccessHandler::new(
            self.subscriptions.clone(),
            self.overrides.clone(),
            self.catalog.clone(),
        )
    }

    pub fn set_override_handler(&self) -> SetFeatureOverrideHandler {
        SetFeatureOverrideHandler::new(
            self.overrides.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
        )
    }

    pub fn webhook_handler(&self) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(
            self.subscriptions.clone(),
            self.ledger.clone(),
            self.usage.clone(),
            self.event_publisher.clone(),
            self.clock.clone(),
            self.catalog.clone(),
        )
    }

    fn snapshot(&self, subscription: &Subscription) -> SubscriptionSnapshot {
        SubscriptionSnapshot::of(subscription, self.clock.now())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/tiers - Pricing and limits for every tier
pub async fn get_pricing_table(State(state): State<BillingAppState>) -> impl IntoResponse {
    Json(state.pricing_table_handler().handle())
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/clinics/:clinic_id/subscription - Provision a trial
pub async fn provision_subscription(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .provision_handler()
        .handle(ProvisionSubscriptionCommand { clinic_id })
        .await?;

    Ok((StatusCode::CREATED, Json(state.snapshot(&subscription))))
}

/// GET /api/clinics/:clinic_id/subscription - Subscription snapshot
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state
        .get_subscription_handler()
        .handle(GetSubscriptionQuery { clinic_id })
        .await?;

    Ok(Json(snapshot))
}

/// DELETE /api/clinics/:clinic_id/subscription - Deactivate the clinic
pub async fn deactivate_clinic(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .deactivate_handler()
        .handle(DeactivateClinicCommand { clinic_id })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/clinics/:clinic_id/subscription/payments - Payment history
pub async fn list_payments(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    let payments = state
        .list_payments_handler()
        .handle(ListPaymentsQuery { clinic_id })
        .await?;

    Ok(Json(PaymentHistoryResponse {
        payments: payments.into_iter().map(PaymentResponse::from).collect(),
    }))
}

/// POST /api/clinics/:clinic_id/subscription/payments - Record an admin payment
///
/// Replays of an already-applied payment id return 200 with the stored record.
pub async fn process_payment(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
    headers: HeaderMap,
    Json(request): Json<ProcessPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let gateway_payment_id = request
        .gateway_payment_id
        .or_else(|| {
            headers
                .get(IDEMPOTENCY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("manual_{}", uuid::Uuid::new_v4().simple()));

    let cmd = ProcessPaymentCommand {
        target: SubscriptionTarget::Clinic(clinic_id),
        amount_minor: request.amount_minor,
        currency: request
            .currency
            .unwrap_or_else(|| state.catalog.tiers.currency().to_string()),
        new_tier: request.new_tier,
        payment_method: request.payment_method,
        gateway_payment_id,
        notes: request.notes,
    };

    let result = state.process_payment_handler().handle(cmd).await?;
    let status = match result.outcome {
        PaymentOutcome::Applied => StatusCode::CREATED,
        PaymentOutcome::AlreadyApplied => StatusCode::OK,
    };

    Ok((status, Json(ProcessPaymentResponse::new(result, state.clock.now()))))
}

/// PUT /api/clinics/:clinic_id/subscription/tier - Administrative tier change
pub async fn change_tier(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
    Json(request): Json<ChangeTierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .change_tier_handler()
        .handle(ChangeTierCommand {
            clinic_id,
            new_tier: request.tier,
            drop_intelligence: request.drop_intelligence,
        })
        .await?;

    Ok(Json(ChangeTierResponse {
        subscription: state.snapshot(&result.subscription),
        from_tier: result.change.from_tier,
        to_tier: result.change.to_tier,
        changed: result.change.changed(),
    }))
}

/// PUT /api/clinics/:clinic_id/subscription/auto-pay - Toggle auto-pay
pub async fn set_auto_pay(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
    Json(request): Json<SetAutoPayRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .set_auto_pay_handler()
        .handle(SetAutoPayCommand {
            clinic_id,
            enabled: request.enabled,
        })
        .await?;

    Ok(Json(state.snapshot(&subscription)))
}

/// PUT /api/clinics/:clinic_id/subscription/payment-method - Save a gateway token
pub async fn attach_payment_method(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
    Json(request): Json<AttachPaymentMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .attach_payment_method_handler()
        .handle(AttachPaymentMethodCommand {
            clinic_id,
            token: request.token,
        })
        .await?;

    Ok(Json(state.snapshot(&subscription)))
}

/// POST /api/clinics/:clinic_id/subscription/cancel - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .cancel_handler()
        .handle(CancelSubscriptionCommand { clinic_id })
        .await?;

    Ok(Json(state.snapshot(&subscription)))
}

/// POST /api/clinics/:clinic_id/subscription/resume - Undo a pending cancellation
pub async fn resume_subscription(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .resume_handler()
        .handle(ResumeSubscriptionCommand { clinic_id })
        .await?;

    Ok(Json(state.snapshot(&subscription)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Entitlements
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/clinics/:clinic_id/entitlements - Every feature with its decision
pub async fn get_entitlements(
    State(state): State<BillingAppState>,
    Path(clinic_id): Path<ClinicId>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .entitlements_handler()
        .handle(GetEntitlementsQuery { clinic_id })
        .await?;

    Ok(Json(view))
}

/// GET /api/clinics/:clinic_id/entitlements/:feature - Gate check
///
/// 200 when allowed, 403 with the required tier when denied.
pub async fn check_feature_access(
    State(state): State<BillingAppState>,
    Path((clinic_id, feature)): Path<(ClinicId, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let feature: Feature = feature.parse()?;
    let decision = state
        .check_access_handler()
        .handle(CheckFeatureAccessQuery { clinic_id, feature })
        .await?;

    let status = if decision.is_allowed() {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    Ok((status, Json(FeatureAccessResponse::from(decision))))
}

/// PUT /api/clinics/:clinic_id/entitlements/:feature/override - Set or clear an override
pub async fn set_feature_override(
    State(state): State<BillingAppState>,
    Path((clinic_id, feature)): Path<(ClinicId, String)>,
    Json(request): Json<SetOverrideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let feature: Feature = feature.parse()?;
    state
        .set_override_handler()
        .handle(SetFeatureOverrideCommand {
            clinic_id,
            feature,
            enabled: request.enabled,
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/razorpay - Handle Razorpay webhook events
pub async fn handle_razorpay_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let verifier = state.webhook_verifier.as_ref().ok_or_else(|| {
        DomainError::new(
            ErrorCode::GatewayMisconfigured,
            "Webhook secret is not configured",
        )
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let event = verifier.verify_and_parse(&body, signature)?;

    let outcome = match state.webhook_handler().handle(event).await? {
        WebhookOutcome::Applied(_) => "applied",
        WebhookOutcome::AlreadyApplied => "already_applied",
        WebhookOutcome::FailureRecorded => "failure_recorded",
        WebhookOutcome::Unapplied { .. } => "unapplied",
        WebhookOutcome::Ignored => "ignored",
    };

    Ok(Json(WebhookAckResponse { outcome }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts domain errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(DomainError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(self.0.code)
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationFailed | ErrorCode::InvalidTier => StatusCode::BAD_REQUEST,
        ErrorCode::UnknownFeature | ErrorCode::SubscriptionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::SubscriptionExists
        | ErrorCode::DuplicatePayment
        | ErrorCode::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorCode::NoPaymentMethod
        | ErrorCode::DowngradeBlocked
        | ErrorCode::InvalidStateTransition => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::GatewayDeclined => StatusCode::PAYMENT_REQUIRED,
        ErrorCode::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::GatewayMisconfigured => StatusCode::BAD_GATEWAY,
        ErrorCode::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
        ErrorCode::DatabaseError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err.into())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let code = match err {
            CatalogError::UnknownFeature(_) => ErrorCode::UnknownFeature,
            CatalogError::UnknownTier(_) => ErrorCode::InvalidTier,
            _ => ErrorCode::InternalError,
        };
        Self(DomainError::new(code, err.to_string()))
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        let code = match err {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                ErrorCode::InvalidWebhookSignature
            }
            WebhookError::MalformedPayload(_) => ErrorCode::ValidationFailed,
        };
        Self(DomainError::new(code, err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = %self.0.code, message = %self.0.message, "request failed");
        }

        let error_code = self.0.code.to_string();
        let body = if self.0.details.is_empty() {
            ErrorResponse::new(error_code, self.0.message)
        } else {
            let details = serde_json::Map::from_iter(
                self.0
                    .details
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v))),
            );
            ErrorResponse::with_details(error_code, self.0.message, serde_json::Value::Object(details))
        };

        (status, Json(body)).into_response()
    }
}
