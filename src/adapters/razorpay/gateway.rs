//! Razorpay payment gateway adapter.
//!
//! Charges saved tokens through the recurring payments API. Every request
//! carries the caller's idempotency key, so a repeated renewal for the same
//! period resolves to the original payment.
//!
//! # Security
//!
//! - Key secret handled via `secrecy::SecretString`
//! - HTTP basic auth (`key_id:key_secret`)

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::subscription::GatewayPaymentId;
use crate::ports::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway};

const DEFAULT_API_BASE_URL: &str = "https://api.razorpay.com";

/// Razorpay API configuration.
#[derive(Clone)]
pub struct RazorpayConfig {
    key_id: String,
    key_secret: SecretString,
    api_base_url: String,
}

impl RazorpayConfig {
    pub fn new(key_id: impl Into<String>, key_secret: SecretString) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Razorpay implementation of [`PaymentGateway`].
pub struct RazorpayGateway {
    config: RazorpayConfig,
    http_client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RecurringPaymentBody<'a> {
    amount: i64,
    currency: &'a str,
    token: &'a str,
    recurring: &'a str,
    description: &'a str,
    notes: RecurringNotes<'a>,
}

#[derive(Debug, Serialize)]
struct RecurringNotes<'a> {
    idempotency_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecurringPaymentResponse {
    #[serde(alias = "id")]
    razorpay_payment_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RazorpayErrorBody {
    #[serde(default)]
    error: RazorpayErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: Option<RazorpayErrorMetadata>,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorMetadata {
    payment_id: Option<String>,
}

/// Maps a failed response to a gateway error kind.
///
/// 5xx and 429 are transport problems; 401/403 mean the keys are wrong.
/// Any other 4xx is the gateway refusing the payment.
fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let parsed: RazorpayErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed.error;
    let reason = if detail.description.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else if detail.code.is_empty() {
        detail.description.clone()
    } else {
        format!("{}: {}", detail.code, detail.description)
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::transport(reason);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return GatewayError::misconfigured(reason);
    }

    GatewayError::Declined {
        reason,
        gateway_payment_id: detail
            .metadata
            .and_then(|m| m.payment_id)
            .and_then(|id| GatewayPaymentId::new(id).ok()),
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let url = format!("{}/v1/payments/create/recurring", self.config.api_base_url);
        let body = RecurringPaymentBody {
            amount: request.amount.amount_minor(),
            currency: request.amount.currency(),
            token: request.method.as_str(),
            recurring: "1",
            description: &request.description,
            notes: RecurringNotes {
                idempotency_key: &request.idempotency_key,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.expose_secret()))
            .header("X-Razorpay-Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error = classify_failure(status, &error_text);
            tracing::warn!(
                status = status.as_u16(),
                idempotency_key = %request.idempotency_key,
                error = %error,
                "Razorpay charge failed"
            );
            return Err(error);
        }

        let payment: RecurringPaymentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::transport(format!("unreadable Razorpay response: {}", e)))?;
        let gateway_payment_id = GatewayPaymentId::new(payment.razorpay_payment_id)
            .map_err(|e| GatewayError::transport(e.to_string()))?;

        tracing::info!(
            gateway_payment_id = %gateway_payment_id,
            idempotency_key = %request.idempotency_key,
            "Razorpay charge settled"
        );
        Ok(ChargeReceipt { gateway_payment_id })
    }
}
