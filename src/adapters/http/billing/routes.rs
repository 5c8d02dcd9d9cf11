//! Axum router configuration for billing endpoints.
//!
//! This module defines the route structure for the billing API
//! and wires each path to its handler.

use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{
    attach_payment_method, cancel_subscription, change_tier, check_feature_access,
    deactivate_clinic, get_entitlements, get_pricing_table, get_subscription,
    handle_razorpay_webhook, list_payments, process_payment, provision_subscription,
    resume_subscription, set_auto_pay, set_feature_override, BillingAppState,
};

/// Routes scoped to one clinic, mounted at `/clinics/:clinic_id`.
///
/// # Routes
/// - `POST|GET|DELETE /subscription` - Provision, snapshot, deactivate
/// - `GET|POST /subscription/payments` - History, admin payment
/// - `PUT /subscription/tier` - Administrative tier change
/// - `PUT /subscription/auto-pay` - Toggle auto-pay
/// - `PUT /subscription/payment-method` - Save a payment method token
/// - `POST /subscription/cancel` / `POST /subscription/resume`
/// - `GET /entitlements` - Every feature with its decision
/// - `GET /entitlements/:feature` - Single gate check
/// - `PUT /entitlements/:feature/override` - Set or clear an override
pub fn clinic_routes() -> Router<BillingAppState> {
    Router::new()
        .route(
            "/subscription",
            post(provision_subscription)
                .get(get_subscription)
                .delete(deactivate_clinic),
        )
        .route(
            "/subscription/payments",
            get(list_payments).post(process_payment),
        )
        .route("/subscription/tier", put(change_tier))
        .route("/subscription/auto-pay", put(set_auto_pay))
        .route("/subscription/payment-method", put(attach_payment_method))
        .route("/subscription/cancel", post(cancel_subscription))
        .route("/subscription/resume", post(resume_subscription))
        .route("/entitlements", get(get_entitlements))
        .route("/entitlements/:feature", get(check_feature_access))
        .route("/entitlements/:feature/override", put(set_feature_override))
}

/// Gateway callbacks. No clinic in the path; the signature authenticates.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/razorpay", post(handle_razorpay_webhook))
}

/// The complete billing router, to be nested under `/api`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .route("/tiers", get(get_pricing_table))
        .nest("/clinics/:clinic_id", clinic_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::clock::FixedClock;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::{
        InMemoryOverrideStore, InMemorySubscriptionStore, InMemoryUsageReader,
    };
    use crate::adapters::razorpay::{RazorpayWebhookVerifier, SIGNATURE_HEADER};
    use crate::domain::catalog::Catalog;
    use crate::domain::foundation::{ClinicId, Timestamp};
    use crate::domain::subscription::SubscriptionPolicy;

    fn app() -> (Router, RazorpayWebhookVerifier) {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let verifier = RazorpayWebhookVerifier::new(SecretString::new("whsec_test".to_string()));
        let state = BillingAppState {
            subscriptions: store.clone(),
            ledger: store,
            overrides: Arc::new(InMemoryOverrideStore::new()),
            usage: Arc::new(InMemoryUsageReader::new()),
            event_publisher: Arc::new(InMemoryEventBus::new()),
            clock: Arc::new(FixedClock::new(Timestamp::from_datetime(
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            ))),
            catalog: Arc::new(Catalog::standard()),
            policy: SubscriptionPolicy::default(),
            webhook_verifier: Some(verifier.clone()),
        };
        (billing_router().with_state(state), verifier)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn request(method: &str, uri: String, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn provisioned(app: &Router) -> ClinicId {
        let clinic_id = ClinicId::new();
        let (status, _) = send(
            app,
            request("POST", format!("/clinics/{}/subscription", clinic_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        clinic_id
    }

    #[tokio::test]
    async fn pricing_table_lists_every_tier() {
        let (app, _) = app();

        let (status, body) = send(&app, request("GET", "/tiers".to_string(), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currency"], "INR");
        assert_eq!(body["tiers"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn provisioning_twice_conflicts() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;

        let (status, body) = send(
            &app,
            request("POST", format!("/clinics/{}/subscription", clinic_id), None),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "SUBSCRIPTION_EXISTS");
    }

    #[tokio::test]
    async fn unknown_clinic_is_not_found() {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            request("GET", format!("/clinics/{}/subscription", ClinicId::new()), None),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "SUBSCRIPTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn trial_clinic_is_denied_pro_feature_with_required_tier() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;

        let (status, body) = send(
            &app,
            request(
                "GET",
                format!("/clinics/{}/entitlements/MULTI_DOCTOR", clinic_id),
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["allowed"], false);
        assert_eq!(body["required_tier"], "PRO");
    }

    #[tokio::test]
    async fn unknown_feature_is_not_found() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;

        let (status, body) = send(
            &app,
            request("GET", format!("/clinics/{}/entitlements/TELEPATHY", clinic_id), None),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "UNKNOWN_FEATURE");
    }

    #[tokio::test]
    async fn override_grants_then_clears_access() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;
        let override_uri = format!("/clinics/{}/entitlements/MULTI_DOCTOR/override", clinic_id);
        let check_uri = format!("/clinics/{}/entitlements/MULTI_DOCTOR", clinic_id);

        let (status, _) = send(
            &app,
            request("PUT", override_uri.clone(), Some(json!({ "enabled": true }))),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, request("GET", check_uri.clone(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["via_override"], true);

        send(&app, request("PUT", override_uri, Some(json!({ "enabled": null })))).await;
        let (status, _) = send(&app, request("GET", check_uri, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_payment_activates_and_replay_returns_ok() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;
        let payment = json!({
            "amount_minor": 249900,
            "new_tier": "PLUS",
            "payment_method": "upi",
            "gateway_payment_id": "upi_ref_881"
        });
        let uri = format!("/clinics/{}/subscription/payments", clinic_id);

        let (status, body) = send(&app, request("POST", uri.clone(), Some(payment.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "applied");
        assert_eq!(body["subscription"]["status"], "ACTIVE");
        assert_eq!(body["subscription"]["tier"], "PLUS");

        let (status, body) = send(&app, request("POST", uri.clone(), Some(payment))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "already_applied");

        let (_, history) = send(&app, request("GET", uri, None)).await;
        assert_eq!(history["payments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_with_unknown_tier_is_bad_request() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;

        let (status, body) = send(
            &app,
            request(
                "POST",
                format!("/clinics/{}/subscription/payments", clinic_id),
                Some(json!({
                    "amount_minor": 100,
                    "new_tier": "GOLD",
                    "payment_method": "cash"
                })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "INVALID_TIER");
    }

    #[tokio::test]
    async fn auto_pay_without_payment_method_is_unprocessable() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;

        let (status, body) = send(
            &app,
            request(
                "PUT",
                format!("/clinics/{}/subscription/auto-pay", clinic_id),
                Some(json!({ "enabled": true })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error_code"], "NO_PAYMENT_METHOD");
    }

    #[tokio::test]
    async fn cancel_then_resume_toggles_flag() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;

        let (status, body) = send(
            &app,
            request("POST", format!("/clinics/{}/subscription/cancel", clinic_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancel_at_period_end"], true);

        let (_, body) = send(
            &app,
            request("POST", format!("/clinics/{}/subscription/resume", clinic_id), None),
        )
        .await;
        assert_eq!(body["cancel_at_period_end"], false);
    }

    #[tokio::test]
    async fn deactivate_returns_no_content_and_allows_reprovision() {
        let (app, _) = app();
        let clinic_id = provisioned(&app).await;
        let uri = format!("/clinics/{}/subscription", clinic_id);

        let (status, _) = send(&app, request("DELETE", uri.clone(), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, request("POST", uri, None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "TRIALING");
    }

    #[tokio::test]
    async fn signed_webhook_is_applied() {
        let (app, verifier) = app();
        let clinic_id = provisioned(&app).await;
        let body = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_hook_1", "amount": 249900, "currency": "INR", "method": "card",
                "notes": { "clinic_id": clinic_id.to_string(), "tier": "PLUS" }
            }}}
        })
        .to_string();
        let signature = verifier.signature_for(body.as_bytes()).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/razorpay")
                    .header(SIGNATURE_HEADER, signature)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, snapshot) = send(
            &app,
            request("GET", format!("/clinics/{}/subscription", clinic_id), None),
        )
        .await;
        assert_eq!(snapshot["status"], "ACTIVE");
    }

    #[tokio::test]
    async fn capture_for_deactivated_clinic_is_acknowledged() {
        let (app, verifier) = app();
        let clinic_id = provisioned(&app).await;
        let (status, _) = send(
            &app,
            request("DELETE", format!("/clinics/{}/subscription", clinic_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let body = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_hook_late", "amount": 249900, "currency": "INR", "method": "upi",
                "notes": { "clinic_id": clinic_id.to_string(), "tier": "PLUS" }
            }}}
        })
        .to_string();
        let mut webhook = request("POST", "/webhooks/razorpay".to_string(), None);
        *webhook.body_mut() = Body::from(body.clone());
        webhook.headers_mut().insert(
            SIGNATURE_HEADER,
            verifier.signature_for(body.as_bytes()).unwrap().parse().unwrap(),
        );

        let (status, ack) = send(&app, webhook).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outcome"], "unapplied");
    }

    #[tokio::test]
    async fn unsigned_webhook_is_unauthorized() {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/webhooks/razorpay".to_string(),
                Some(json!({ "event": "payment.captured" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "INVALID_WEBHOOK_SIGNATURE");
    }
}
