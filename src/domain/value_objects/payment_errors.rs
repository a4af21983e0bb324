use axum::http::StatusCode;
use thiserror::Error;

use super::enums::payment_statuses::PaymentStatus;

/// Error taxonomy for the payment engine. Adapter/transport failures never
/// leave an adapter raw; they are wrapped into `Provider` with the provider
/// name so the orchestration layer handles a single shape.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment validation failed: {0}")]
    Validation(String),

    #[error("cannot add {0} to {1}")]
    CurrencyMismatch(String, String),

    #[error("payment not found")]
    NotFound,

    #[error("a payment already exists for order {0}")]
    DuplicateOrder(String),

    #[error("payment status must be {required} but is {current}")]
    InvalidStatus {
        current: PaymentStatus,
        required: PaymentStatus,
    },

    #[error("error communicating with {provider} payment service: {message}")]
    Provider { provider: String, message: String },

    #[error("webhook signature verification failed for {provider}")]
    InvalidWebhookSignature { provider: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn provider(provider: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        PaymentError::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_)
            | PaymentError::CurrencyMismatch(_, _)
            | PaymentError::InvalidStatus { .. } => StatusCode::BAD_REQUEST,
            PaymentError::NotFound => StatusCode::NOT_FOUND,
            PaymentError::DuplicateOrder(_) => StatusCode::CONFLICT,
            PaymentError::Provider { .. } => StatusCode::BAD_GATEWAY,
            // Treated as accepted-but-ignored at the webhook boundary; the
            // status code only matters if it ever reaches a non-webhook route.
            PaymentError::InvalidWebhookSignature { .. } => StatusCode::BAD_REQUEST,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
