//! Billing lifecycle and sweep configuration

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::scheduler::SweeperConfig;
use crate::application::handlers::subscription::RenewalSettings;
use crate::application::RetryPolicy;
use crate::domain::catalog::BillingCycle;
use crate::domain::subscription::SubscriptionPolicy;

use super::error::ValidationError;

/// Ten years; longer windows overflow period arithmetic and storage.
const MAX_WINDOW_DAYS: u64 = 3_650;

/// Billing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub trial_days: u32,
    pub grace_period_days: u32,
    /// Cycle for new subscriptions: `monthly` or `yearly`
    pub billing_cycle: CycleSetting,
    /// Sweep passes with an unreachable gateway before a renewal is failed
    pub max_renewal_attempts: u32,
    pub charge_timeout_secs: u64,
    /// Charge attempts within one sweep pass
    pub charge_retry_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: u32,
    pub sweep_concurrency: usize,
    /// ISO 4217 code for catalog prices
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CycleSetting {
    #[default]
    Monthly,
    Yearly,
}

impl From<CycleSetting> for BillingCycle {
    fn from(setting: CycleSetting) -> Self {
        match setting {
            CycleSetting::Monthly => BillingCycle::Monthly,
            CycleSetting::Yearly => BillingCycle::Yearly,
        }
    }
}

impl BillingConfig {
    pub fn policy(&self) -> SubscriptionPolicy {
        SubscriptionPolicy {
            trial_days: self.trial_days,
            grace_period_days: self.grace_period_days,
            billing_cycle: self.billing_cycle.into(),
        }
    }

    pub fn renewal_settings(&self) -> RenewalSettings {
        RenewalSettings {
            retry: RetryPolicy::new(
                self.charge_retry_attempts,
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
            ),
            charge_timeout: Duration::from_secs(self.charge_timeout_secs),
            max_renewal_attempts: self.max_renewal_attempts,
        }
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            batch_size: self.sweep_batch_size,
            concurrency: self.sweep_concurrency,
        }
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive: [(&'static str, u64); 7] = [
            ("trial_days", u64::from(self.trial_days)),
            ("grace_period_days", u64::from(self.grace_period_days)),
            ("max_renewal_attempts", u64::from(self.max_renewal_attempts)),
            ("charge_timeout_secs", self.charge_timeout_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("sweep_batch_size", u64::from(self.sweep_batch_size)),
            ("sweep_concurrency", self.sweep_concurrency as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ValidationError::MustBePositive(name));
        }
        let bounded: [(&'static str, u64, u64); 5] = [
            ("trial_days", u64::from(self.trial_days), MAX_WINDOW_DAYS),
            ("grace_period_days", u64::from(self.grace_period_days), MAX_WINDOW_DAYS),
            ("charge_timeout_secs", self.charge_timeout_secs, 300),
            ("sweep_batch_size", u64::from(self.sweep_batch_size), 10_000),
            ("sweep_concurrency", self.sweep_concurrency as u64, 256),
        ];
        if let Some((field, _, max)) = bounded.iter().find(|(_, value, max)| value > max) {
            return Err(ValidationError::OutOfRange {
                field: *field,
                max: *max,
            });
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency(self.currency.clone()));
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_days: 14,
            grace_period_days: 7,
            billing_cycle: CycleSetting::Monthly,
            max_renewal_attempts: 3,
            charge_timeout_secs: 10,
            charge_retry_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            sweep_interval_secs: 300,
            sweep_batch_size: 100,
            sweep_concurrency: 4,
            currency: "INR".to_string(),
        }
    }
}
