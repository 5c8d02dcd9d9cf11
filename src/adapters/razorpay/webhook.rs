//! Razorpay webhook verification and parsing.
//!
//! Razorpay signs the raw request body with the webhook secret:
//! `X-Razorpay-Signature = hex(HMAC-SHA256(secret, body))`. The body must be
//! verified byte-for-byte before it is parsed.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::application::handlers::subscription::GatewayWebhookEvent;
use crate::domain::foundation::ClinicId;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("missing X-Razorpay-Signature header")]
    MissingSignature,

    #[error("webhook signature does not match")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Checks signatures and turns verified payloads into [`GatewayWebhookEvent`]s.
#[derive(Clone)]
pub struct RazorpayWebhookVerifier {
    secret: SecretString,
}

impl RazorpayWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature, then parses the body.
    pub fn verify_and_parse(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayWebhookEvent, WebhookError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        self.verify(body, signature)?;
        parse_event(body)
    }

    /// Constant-time signature check.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), WebhookError> {
        let provided = hex::decode(signature).map_err(|_| WebhookError::InvalidSignature)?;
        let expected = self.sign(body)?;

        if expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() != 1 {
            tracing::warn!("invalid Razorpay webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    fn sign(&self, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Hex signature for `body`, as Razorpay would send it.
    pub fn signature_for(&self, body: &[u8]) -> Result<String, WebhookError> {
        self.sign(body).map(hex::encode)
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<PaymentWrapper>,
}

#[derive(Debug, Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    notes: PaymentNotes,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Razorpay sends `notes` as an object, or as `[]` when empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaymentNotes {
    clinic_id: Option<String>,
    tier: Option<String>,
}

fn deserialize_notes(value: serde_json::Value) -> PaymentNotes {
    serde_json::from_value(value).unwrap_or_default()
}

fn parse_event(body: &[u8]) -> Result<GatewayWebhookEvent, WebhookError> {
    let raw: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let envelope: WebhookEnvelope = serde_json::from_value(normalize_notes(raw))
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    match envelope.event.as_str() {
        "payment.captured" => {
            let payment = payment_entity(envelope.payload)?;
            let clinic_id = clinic_id_of(&payment.notes)?;
            let tier = payment
                .notes
                .tier
                .clone()
                .ok_or_else(|| WebhookError::MalformedPayload("notes.tier is required".to_string()))?;
            Ok(GatewayWebhookEvent::PaymentCaptured {
                gateway_payment_id: payment.id,
                amount_minor: payment.amount,
                currency: payment.currency,
                method: payment.method.unwrap_or_else(|| "unknown".to_string()),
                clinic_id,
                tier,
                notes: payment.description,
            })
        }
        "payment.failed" => {
            let payment = payment_entity(envelope.payload)?;
            let clinic_id = clinic_id_of(&payment.notes)?;
            Ok(GatewayWebhookEvent::PaymentFailed {
                gateway_payment_id: Some(payment.id),
                amount_minor: payment.amount,
                currency: payment.currency,
                clinic_id,
                reason: payment
                    .error_description
                    .unwrap_or_else(|| "payment failed".to_string()),
            })
        }
        other => Ok(GatewayWebhookEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}

/// Replaces an empty-array `notes` with an object so it deserializes.
fn normalize_notes(mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(notes) = raw.pointer_mut("/payload/payment/entity/notes") {
        let parsed = deserialize_notes(notes.take());
        *notes = serde_json::json!({ "clinic_id": parsed.clinic_id, "tier": parsed.tier });
    }
    raw
}

fn payment_entity(payload: Option<WebhookPayload>) -> Result<PaymentEntity, WebhookError> {
    payload
        .and_then(|p| p.payment)
        .map(|p| p.entity)
        .ok_or_else(|| WebhookError::MalformedPayload("missing payload.payment.entity".to_string()))
}

fn clinic_id_of(notes: &PaymentNotes) -> Result<ClinicId, WebhookError> {
    let raw = notes
        .clinic_id
        .as_deref()
        .ok_or_else(|| WebhookError::MalformedPayload("notes.clinic_id is required".to_string()))?;
    raw.parse()
        .map_err(|_| WebhookError::MalformedPayload(format!("invalid notes.clinic_id '{}'", raw)))
}
