use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Supported payment providers. Extending this set means writing a new
/// adapter and wiring it into the provider factory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentProvider {
    #[serde(rename = "MERCADO_PAGO")]
    MercadoPago,
    #[serde(rename = "STRIPE")]
    Stripe,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::MercadoPago => "MERCADO_PAGO",
            PaymentProvider::Stripe => "STRIPE",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "MERCADO_PAGO" => Some(PaymentProvider::MercadoPago),
            "STRIPE" => Some(PaymentProvider::Stripe),
            _ => None,
        }
    }
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
