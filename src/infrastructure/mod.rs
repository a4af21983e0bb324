pub mod axum_http;
pub mod payment_providers;
pub mod postgres;
