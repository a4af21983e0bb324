use serde::{Deserialize, Serialize};

use super::payment_errors::PaymentError;

/// Immutable amount + currency pair. Arithmetic returns a fresh instance and
/// refuses to mix currencies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Money {
    amount: f64,
    currency: String,
}

impl Money {
    pub fn new(amount: f64, currency: &str) -> Result<Self, PaymentError> {
        if amount <= 0.0 {
            return Err(PaymentError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::Validation(
                "currency must be a 3-letter code".to_string(),
            ));
        }

        Ok(Self {
            amount,
            currency: currency.to_uppercase(),
        })
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn add(&self, other: &Money) -> Result<Money, PaymentError> {
        if self.currency != other.currency {
            return Err(PaymentError::CurrencyMismatch(
                other.currency.clone(),
                self.currency.clone(),
            ));
        }
        Money::new(self.amount + other.amount, &self.currency)
    }

    pub fn multiply(&self, factor: f64) -> Result<Money, PaymentError> {
        Money::new(self.amount * factor, &self.currency)
    }
}
