//! Payment gateway configuration (Razorpay)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Razorpay credentials.
///
/// A development run with no `key_id` charges through an in-process mock
/// gateway. Every other environment must configure real keys.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// API key id, `rzp_test_...` or `rzp_live_...`
    #[serde(default)]
    pub key_id: Option<String>,

    #[serde(default)]
    pub key_secret: Option<SecretString>,

    /// Secret for `X-Razorpay-Signature` verification
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl GatewayConfig {
    /// Key id and secret, when both are configured.
    pub fn credentials(&self) -> Option<(&str, &SecretString)> {
        let key_id = self.key_id.as_deref().filter(|id| !id.is_empty())?;
        let secret = self
            .key_secret
            .as_ref()
            .filter(|secret| !secret.expose_secret().is_empty())?;
        Some((key_id, secret))
    }

    pub fn webhook_secret(&self) -> Option<&SecretString> {
        self.webhook_secret
            .as_ref()
            .filter(|secret| !secret.expose_secret().is_empty())
    }

    /// Check if using Razorpay test mode
    pub fn is_test_mode(&self) -> bool {
        self.key_id
            .as_deref()
            .is_some_and(|id| id.starts_with("rzp_test_"))
    }

    /// Validate gateway configuration
    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        let has_id = self.key_id.as_deref().is_some_and(|id| !id.is_empty());
        let has_secret = self
            .key_secret
            .as_ref()
            .is_some_and(|secret| !secret.expose_secret().is_empty());
        if has_id != has_secret {
            return Err(ValidationError::IncompleteGatewayCredentials);
        }
        if let Some(key_id) = self.key_id.as_deref().filter(|id| !id.is_empty()) {
            if !key_id.starts_with("rzp_") {
                return Err(ValidationError::InvalidGatewayKey);
            }
        }
        if self.credentials().is_none() && !environment.allows_mock_gateway() {
            return Err(ValidationError::MissingRequired("GATEWAY__KEY_ID"));
        }
        if environment == Environment::Production && !self.api_base_url.starts_with("https://") {
            return Err(ValidationError::GatewayUrlMustBeHttps);
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            api_base_url: default_api_base_url(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.razorpay.com".to_string()
}
