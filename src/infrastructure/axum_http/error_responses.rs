use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::domain::value_objects::payment_errors::PaymentError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

/// HTTP rendering of the domain error taxonomy.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        // Don't leak internal error detail to the client
        let message = match &self.0 {
            PaymentError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}
