use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    application::usecases::{inventory::StockEffects, payments::PaymentUseCase},
    config::config_model::DotEnvyConfig,
    domain::{
        repositories::{
            payments::PaymentRepository, products::ProductRepository, users::UserRepository,
        },
        value_objects::{
            enums::payment_providers::PaymentProvider,
            payments::{CreatePaymentModel, WebhookRequest},
        },
    },
    infrastructure::{
        axum_http::error_responses::ApiError,
        payment_providers::factory::ProviderFactory,
        postgres::{
            postgres_connection::PgPoolSquad,
            repositories::{
                payments::PaymentPostgres, products::ProductPostgres, users::UserPostgres,
            },
        },
    },
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundBody {
    pub amount: Option<f64>,
}

pub fn routes(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Router {
    let payment_repository = PaymentPostgres::new(Arc::clone(&db_pool));
    let product_repository = ProductPostgres::new(Arc::clone(&db_pool));
    let user_repository = UserPostgres::new(Arc::clone(&db_pool));

    let payment_usecase = PaymentUseCase::new(
        Arc::new(payment_repository),
        StockEffects::new(Arc::new(product_repository), Arc::new(user_repository)),
        Arc::new(ProviderFactory::from_config(&config)),
    );

    Router::new()
        .route(
            "/",
            post(create_payment::<PaymentPostgres, ProductPostgres, UserPostgres>),
        )
        .route(
            "/webhook/:provider",
            post(handle_webhook::<PaymentPostgres, ProductPostgres, UserPostgres>),
        )
        .route(
            "/:order_id",
            get(get_payment_status::<PaymentPostgres, ProductPostgres, UserPostgres>),
        )
        .route(
            "/:order_id/refund",
            post(refund_payment::<PaymentPostgres, ProductPostgres, UserPostgres>),
        )
        .route(
            "/:order_id/refunds",
            get(get_refunds::<PaymentPostgres, ProductPostgres, UserPostgres>),
        )
        .route(
            "/:order_id/refunds/:refund_id",
            get(get_refund::<PaymentPostgres, ProductPostgres, UserPostgres>),
        )
        .with_state(Arc::new(payment_usecase))
}

pub async fn create_payment<R, P, U>(
    State(payment_usecase): State<Arc<PaymentUseCase<R, P, U>>>,
    Json(create_payment_model): Json<CreatePaymentModel>,
) -> impl IntoResponse
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    match payment_usecase.create_payment(create_payment_model).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

pub async fn get_payment_status<R, P, U>(
    State(payment_usecase): State<Arc<PaymentUseCase<R, P, U>>>,
    Path(order_id): Path<String>,
) -> impl IntoResponse
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    match payment_usecase.get_payment_status(&order_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

pub async fn refund_payment<R, P, U>(
    State(payment_usecase): State<Arc<PaymentUseCase<R, P, U>>>,
    Path(order_id): Path<String>,
    body: Option<Json<RefundBody>>,
) -> impl IntoResponse
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    let amount = body.and_then(|Json(body)| body.amount);
    match payment_usecase.refund_payment(&order_id, amount).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

pub async fn get_refunds<R, P, U>(
    State(payment_usecase): State<Arc<PaymentUseCase<R, P, U>>>,
    Path(order_id): Path<String>,
) -> impl IntoResponse
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    match payment_usecase.get_refunds(&order_id).await {
        Ok(refunds) => (StatusCode::OK, Json(refunds)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

pub async fn get_refund<R, P, U>(
    State(payment_usecase): State<Arc<PaymentUseCase<R, P, U>>>,
    Path((order_id, refund_id)): Path<(String, String)>,
) -> impl IntoResponse
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    match payment_usecase.get_refund(&order_id, &refund_id).await {
        Ok(refund) => (StatusCode::OK, Json(refund)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// Webhook deliveries are always acknowledged with 200: a non-2xx answer
/// makes the provider retry a payload we already know we cannot process.
pub async fn handle_webhook<R, P, U>(
    State(payment_usecase): State<Arc<PaymentUseCase<R, P, U>>>,
    Path(provider_param): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    let provider = match parse_provider(&provider_param) {
        Some(provider) => provider,
        None => {
            warn!(%provider_param, "webhook: unknown provider in path, acknowledging anyway");
            return (StatusCode::OK, Json(json!({ "received": true }))).into_response();
        }
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    info!(%provider, body_bytes = body.len(), "webhook: delivery received");

    if let Err(err) = payment_usecase
        .process_webhook(
            provider,
            WebhookRequest {
                raw_body: body.to_vec(),
                signature,
            },
        )
        .await
    {
        warn!(%provider, error = %err, "webhook: acknowledged despite processing failure");
    }

    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}

fn parse_provider(param: &str) -> Option<PaymentProvider> {
    PaymentProvider::from_str(&param.to_uppercase().replace('-', "_"))
}
