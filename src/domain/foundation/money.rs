//! Money value object in minor currency units.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// A non-negative amount in minor units (paise for INR) tagged with an
/// ISO-4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: String,
}

impl Money {
    /// Creates a money value, rejecting negative amounts and blank currencies.
    pub fn new(amount_minor: i64, currency: impl Into<String>) -> Result<Self, ValidationError> {
        if amount_minor < 0 {
            return Err(ValidationError::negative("amount", amount_minor));
        }
        let currency = currency.into().trim().to_ascii_uppercase();
        if currency.is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not a three-letter currency code", currency),
            ));
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// Amount in minor units.
    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    /// Upper-case currency code.
    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{:02}",
            self.currency,
            self.amount_minor / 100,
            self.amount_minor % 100
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_currency_code() {
        let money = Money::new(249900, " inr ").unwrap();
        assert_eq!(money.currency(), "INR");
        assert_eq!(money.amount_minor(), 249900);
    }

    #[test]
    fn rejects_negative_amounts() {
        assert_eq!(
            Money::new(-1, "INR"),
            Err(ValidationError::negative("amount", -1))
        );
    }

    #[test]
    fn zero_is_a_valid_amount() {
        assert!(Money::new(0, "INR").is_ok());
    }

    #[test]
    fn rejects_malformed_currency() {
        assert!(Money::new(100, "").is_err());
        assert!(Money::new(100, "RUPEE").is_err());
        assert!(Money::new(100, "1NR").is_err());
    }

    #[test]
    fn displays_major_and_minor_units() {
        assert_eq!(Money::new(249900, "INR").unwrap().to_string(), "INR 2499.00");
        assert_eq!(Money::new(5, "INR").unwrap().to_string(), "INR 0.05");
    }
}
