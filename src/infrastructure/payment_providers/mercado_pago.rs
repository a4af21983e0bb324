use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::config_model,
    domain::{
        repositories::payment_providers::PaymentProviderAdapter,
        value_objects::{
            enums::{payment_providers::PaymentProvider, payment_statuses::PaymentStatus},
            payment_errors::PaymentError,
            payments::{
                PaymentIds, ProviderPaymentOutcome, ProviderPaymentRequest, RefundOutcome,
                RefundRecordModel, RefundRequest, WebhookEventModel, WebhookRequest,
            },
        },
    },
};

const API_BASE: &str = "https://api.mercadopago.com";

/// Mercado Pago adapter: redirect + preference flow. Webhooks arrive
/// unsigned in three shapes (v1 action, v0 topic/resource, merchant order)
/// and carry only a payment id, so normalization fetches the payment back
/// from the API.
pub struct MercadoPagoAdapter {
    http: reqwest::Client,
    access_token: String,
    webhook_url: String,
    statement_descriptor: String,
}

#[derive(Debug, Serialize)]
struct PreferenceItem {
    id: String,
    title: String,
    description: String,
    quantity: u32,
    unit_price: f64,
    currency_id: String,
}

#[derive(Debug, Serialize)]
struct PreferencePayer {
    email: String,
}

#[derive(Debug, Serialize)]
struct PreferenceBackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct PreferenceBody {
    items: Vec<PreferenceItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<PreferencePayer>,
    back_urls: PreferenceBackUrls,
    external_reference: String,
    notification_url: String,
    statement_descriptor: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Debug, Deserialize)]
struct MpPayment {
    id: i64,
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MpPaymentSearch {
    #[serde(default)]
    results: Vec<MpPayment>,
}

#[derive(Debug, Deserialize)]
struct MpRefund {
    id: i64,
    amount: f64,
    status: String,
    date_created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MpMerchantOrder {
    #[serde(default)]
    payments: Vec<MpOrderPayment>,
}

#[derive(Debug, Deserialize)]
struct MpOrderPayment {
    id: i64,
}

/// What a webhook payload turned out to be, before any API lookups.
#[derive(Debug, PartialEq)]
enum MpNotification {
    Payment(String),
    MerchantOrder(String),
    Unrecognized,
}

impl MercadoPagoAdapter {
    pub fn new(
        mercado_pago: &config_model::MercadoPago,
        payment: &config_model::Payment,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: mercado_pago.access_token.clone(),
            webhook_url: mercado_pago.webhook_url.clone(),
            statement_descriptor: payment.statement_descriptor.clone(),
        }
    }

    fn provider_error(message: impl std::fmt::Display) -> PaymentError {
        PaymentError::provider(PaymentProvider::MercadoPago, message)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let api_message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("message").and_then(|m| m.as_str().map(String::from)));

        error!(
            status = %status,
            api_message = ?api_message,
            response_body = %body,
            context = %context,
            "mercado pago api request failed"
        );

        Err(Self::provider_error(format!(
            "{} failed with status {}: {}",
            context,
            status,
            api_message.unwrap_or(body)
        )))
    }

    /// The single place where Mercado Pago status vocabulary becomes
    /// canonical. Unknown codes degrade to PENDING instead of failing.
    fn map_status(mp_status: &str) -> PaymentStatus {
        match mp_status.to_lowercase().as_str() {
            "approved" => PaymentStatus::Approved,
            "rejected" | "charged_back" => PaymentStatus::Rejected,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            // pending, authorized, in_process, in_mediation and anything new
            _ => PaymentStatus::Pending,
        }
    }

    /// Recognizes the three webhook shapes without touching the network.
    fn extract_notification(payload: &Value) -> MpNotification {
        if let (Some(action), Some(id)) = (
            payload.get("action").and_then(Value::as_str),
            payload.pointer("/data/id"),
        ) {
            if action.starts_with("payment.") {
                let id = match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return MpNotification::Payment(id);
            }
        }

        let topic = payload.get("topic").and_then(Value::as_str);
        let resource = payload.get("resource").and_then(Value::as_str);

        match (topic, resource) {
            (Some("payment"), Some(resource)) => {
                let id = resource.rsplit('/').next().unwrap_or(resource).to_string();
                MpNotification::Payment(id)
            }
            (Some("merchant_order"), Some(resource)) => {
                let id = resource.rsplit('/').next().unwrap_or(resource).to_string();
                MpNotification::MerchantOrder(id)
            }
            _ => MpNotification::Unrecognized,
        }
    }

    async fn get_json(&self, url: &str, context: &str) -> Result<Value, PaymentError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(Self::provider_error)?;
        let resp = Self::ensure_success(resp, context).await?;
        resp.json::<Value>().await.map_err(Self::provider_error)
    }

    async fn fetch_payment_status(&self, transaction_id: &str) -> Option<PaymentStatus> {
        info!(%transaction_id, "mercado pago: fetching payment");
        let url = format!("{API_BASE}/v1/payments/{transaction_id}");
        match self.get_json(&url, "get payment").await {
            Ok(raw) => match serde_json::from_value::<MpPayment>(raw) {
                Ok(payment) => Some(Self::map_status(&payment.status)),
                Err(err) => {
                    warn!(%transaction_id, error = %err, "mercado pago: malformed payment body");
                    None
                }
            },
            Err(err) => {
                warn!(%transaction_id, error = %err, "mercado pago: payment lookup failed");
                None
            }
        }
    }

    async fn search_payment_status(&self, order_id: &str) -> PaymentStatus {
        info!(%order_id, "mercado pago: searching payment by external reference");
        let url = format!(
            "{API_BASE}/v1/payments/search?external_reference={order_id}&sort=date_created&criteria=desc"
        );
        match self.get_json(&url, "search payments").await {
            Ok(raw) => match serde_json::from_value::<MpPaymentSearch>(raw) {
                Ok(search) => match search.results.first() {
                    Some(payment) => Self::map_status(&payment.status),
                    None => {
                        warn!(%order_id, "mercado pago: no payments found for order");
                        PaymentStatus::Pending
                    }
                },
                Err(err) => {
                    warn!(%order_id, error = %err, "mercado pago: malformed search body");
                    PaymentStatus::Pending
                }
            },
            Err(err) => {
                warn!(%order_id, error = %err, "mercado pago: payment search failed");
                PaymentStatus::Pending
            }
        }
    }

    /// Fetches one payment and normalizes it into a webhook event. A payment
    /// the provider cannot return is skipped (None), not an error.
    async fn process_payment_update(
        &self,
        payment_id: &str,
    ) -> Result<Option<WebhookEventModel>, PaymentError> {
        info!(%payment_id, "mercado pago: fetching payment for webhook");
        let url = format!("{API_BASE}/v1/payments/{payment_id}");
        let raw = match self.get_json(&url, "get webhook payment").await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%payment_id, error = %err, "mercado pago: webhook payment lookup failed");
                return Ok(None);
            }
        };

        let payment: MpPayment = match serde_json::from_value(raw.clone()) {
            Ok(payment) => payment,
            Err(err) => {
                warn!(%payment_id, error = %err, "mercado pago: malformed webhook payment");
                return Ok(None);
            }
        };

        Ok(Some(WebhookEventModel {
            provider: PaymentProvider::MercadoPago,
            provider_payment_id: None,
            external_reference: payment.external_reference,
            transaction_id: Some(payment.id.to_string()),
            status: Self::map_status(&payment.status),
            raw,
        }))
    }

    async fn fetch_merchant_order(&self, order_id: &str) -> Result<MpMerchantOrder, PaymentError> {
        let url = format!("{API_BASE}/merchant_orders/{order_id}");
        let raw = self.get_json(&url, "get merchant order").await?;
        serde_json::from_value(raw).map_err(Self::provider_error)
    }

    fn normalize_refund(refund: &MpRefund, raw: Value) -> RefundRecordModel {
        RefundRecordModel {
            id: refund.id.to_string(),
            amount: refund.amount,
            status: Self::map_status(&refund.status),
            date_created: refund.date_created,
            metadata: raw,
        }
    }
}

#[async_trait]
impl PaymentProviderAdapter for MercadoPagoAdapter {
    async fn create_payment(
        &self,
        request: ProviderPaymentRequest,
    ) -> Result<ProviderPaymentOutcome, PaymentError> {
        let body = PreferenceBody {
            items: request
                .items
                .iter()
                .map(|item| PreferenceItem {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    description: item.description.clone().unwrap_or_default(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    currency_id: request.currency.clone(),
                })
                .collect(),
            payer: request
                .customer_email
                .clone()
                .map(|email| PreferencePayer { email }),
            back_urls: PreferenceBackUrls {
                success: format!("{}/success", request.callback_url),
                failure: format!("{}/failure", request.callback_url),
                pending: format!("{}/pending", request.callback_url),
            },
            external_reference: request.external_reference.clone(),
            notification_url: self.webhook_url.clone(),
            statement_descriptor: self.statement_descriptor.clone(),
        };

        info!(
            external_reference = %request.external_reference,
            item_count = request.items.len(),
            "mercado pago: creating preference"
        );

        let resp = self
            .http
            .post(format!("{API_BASE}/checkout/preferences"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::provider_error)?;
        let resp = Self::ensure_success(resp, "create preference").await?;

        let raw = resp.json::<Value>().await.map_err(Self::provider_error)?;
        let preference: PreferenceResponse =
            serde_json::from_value(raw.clone()).map_err(Self::provider_error)?;

        Ok(ProviderPaymentOutcome {
            status: PaymentStatus::Pending,
            provider_payment_id: preference.id,
            redirect_url: preference.init_point,
            external_reference: request.external_reference,
            amount: request.amount,
            processor_response: raw,
        })
    }

    async fn get_payment_details(&self, ids: PaymentIds) -> Result<PaymentStatus, PaymentError> {
        // Direct lookup first; a failed lookup falls back to searching by the
        // external reference. A failed status poll is never an error, callers
        // learn the truth from the next webhook.
        if let Some(transaction_id) = ids.transaction_id.as_deref() {
            if let Some(status) = self.fetch_payment_status(transaction_id).await {
                return Ok(status);
            }
        }
        if let Some(order_id) = ids.order_id.as_deref() {
            return Ok(self.search_payment_status(order_id).await);
        }
        if ids.transaction_id.is_some() {
            return Ok(PaymentStatus::Pending);
        }
        Err(PaymentError::Validation(
            "either transactionId or orderId must be provided".to_string(),
        ))
    }

    async fn refund_payment(&self, request: RefundRequest) -> Result<RefundOutcome, PaymentError> {
        let transaction_id = request
            .payment_ids
            .transaction_id
            .as_deref()
            .ok_or_else(|| {
                PaymentError::Validation("transactionId is required for a refund".to_string())
            })?;

        // Fresh key per call: a retried request after a transport failure
        // cannot double-refund.
        let idempotency_key = Uuid::new_v4().to_string();
        let body = match request.amount {
            Some(amount) => serde_json::json!({ "amount": amount }),
            None => serde_json::json!({}),
        };

        info!(%transaction_id, amount = ?request.amount, "mercado pago: requesting refund");

        let resp = self
            .http
            .post(format!("{API_BASE}/v1/payments/{transaction_id}/refunds"))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::provider_error)?;
        let resp = Self::ensure_success(resp, "create refund").await?;

        let raw = resp.json::<Value>().await.map_err(Self::provider_error)?;
        let refund: MpRefund = serde_json::from_value(raw.clone()).map_err(Self::provider_error)?;

        Ok(RefundOutcome {
            status: Self::map_status(&refund.status),
            refund_id: Some(refund.id.to_string()),
            processor_response: raw,
        })
    }

    async fn get_refunds(&self, ids: PaymentIds) -> Result<Vec<RefundRecordModel>, PaymentError> {
        let transaction_id = ids.transaction_id.as_deref().ok_or_else(|| {
            PaymentError::Validation("transactionId is required to list refunds".to_string())
        })?;

        let url = format!("{API_BASE}/v1/payments/{transaction_id}/refunds");
        let raw = self.get_json(&url, "list refunds").await?;

        let refunds: Vec<MpRefund> =
            serde_json::from_value(raw.clone()).map_err(Self::provider_error)?;
        let raw_entries = raw.as_array().cloned().unwrap_or_default();

        Ok(refunds
            .iter()
            .zip(raw_entries)
            .map(|(refund, raw)| Self::normalize_refund(refund, raw))
            .collect())
    }

    async fn get_refund(&self, ids: PaymentIds) -> Result<RefundRecordModel, PaymentError> {
        let transaction_id = ids.transaction_id.as_deref().ok_or_else(|| {
            PaymentError::Validation("transactionId is required to fetch a refund".to_string())
        })?;
        let refund_id = ids.refund_id.as_deref().ok_or_else(|| {
            PaymentError::Validation("refundId must be provided".to_string())
        })?;

        let url = format!("{API_BASE}/v1/payments/{transaction_id}/refunds/{refund_id}");
        let raw = self.get_json(&url, "get refund").await?;
        let refund: MpRefund = serde_json::from_value(raw.clone()).map_err(Self::provider_error)?;

        Ok(Self::normalize_refund(&refund, raw))
    }

    async fn process_webhook(
        &self,
        request: WebhookRequest,
    ) -> Result<Vec<WebhookEventModel>, PaymentError> {
        let payload: Value =
            serde_json::from_slice(&request.raw_body).map_err(Self::provider_error)?;

        match Self::extract_notification(&payload) {
            MpNotification::Payment(payment_id) => {
                info!(%payment_id, "mercado pago: payment webhook detected");
                Ok(self
                    .process_payment_update(&payment_id)
                    .await?
                    .into_iter()
                    .collect())
            }
            MpNotification::MerchantOrder(order_id) => {
                info!(%order_id, "mercado pago: merchant order webhook detected");
                let order = match self.fetch_merchant_order(&order_id).await {
                    Ok(order) => order,
                    Err(err) => {
                        warn!(%order_id, error = %err, "mercado pago: merchant order lookup failed");
                        return Ok(Vec::new());
                    }
                };

                if order.payments.is_empty() {
                    warn!(%order_id, "mercado pago: merchant order has no payments");
                    return Ok(Vec::new());
                }

                // One normalized event per contained payment; the reconciler
                // treats each independently.
                let mut events = Vec::with_capacity(order.payments.len());
                for payment in &order.payments {
                    if let Some(event) =
                        self.process_payment_update(&payment.id.to_string()).await?
                    {
                        events.push(event);
                    }
                }
                Ok(events)
            }
            MpNotification::Unrecognized => {
                warn!("mercado pago: unrecognized webhook format");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_provider_statuses_to_canonical_set() {
        let cases = [
            ("pending", PaymentStatus::Pending),
            ("approved", PaymentStatus::Approved),
            ("authorized", PaymentStatus::Pending),
            ("in_process", PaymentStatus::Pending),
            ("in_mediation", PaymentStatus::Pending),
            ("rejected", PaymentStatus::Rejected),
            ("cancelled", PaymentStatus::Cancelled),
            ("refunded", PaymentStatus::Refunded),
            ("charged_back", PaymentStatus::Rejected),
            ("APPROVED", PaymentStatus::Approved),
        ];
        for (input, expected) in cases {
            assert_eq!(MercadoPagoAdapter::map_status(input), expected, "{input}");
        }
    }

    #[test]
    fn unknown_status_degrades_to_pending() {
        assert_eq!(
            MercadoPagoAdapter::map_status("some_future_code"),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn recognizes_v1_payment_notifications() {
        let payload = json!({
            "action": "payment.updated",
            "data": { "id": "12345" }
        });
        assert_eq!(
            MercadoPagoAdapter::extract_notification(&payload),
            MpNotification::Payment("12345".to_string())
        );
    }

    #[test]
    fn recognizes_v1_numeric_payment_ids() {
        let payload = json!({
            "action": "payment.created",
            "data": { "id": 98765 }
        });
        assert_eq!(
            MercadoPagoAdapter::extract_notification(&payload),
            MpNotification::Payment("98765".to_string())
        );
    }

    #[test]
    fn recognizes_v0_payment_notifications_with_resource_urls() {
        let payload = json!({
            "topic": "payment",
            "resource": "https://api.mercadopago.com/v1/payments/555"
        });
        assert_eq!(
            MercadoPagoAdapter::extract_notification(&payload),
            MpNotification::Payment("555".to_string())
        );
    }

    #[test]
    fn recognizes_merchant_order_notifications() {
        let payload = json!({
            "topic": "merchant_order",
            "resource": "https://api.mercadopago.com/merchant_orders/777"
        });
        assert_eq!(
            MercadoPagoAdapter::extract_notification(&payload),
            MpNotification::MerchantOrder("777".to_string())
        );
    }

    #[test]
    fn non_payment_actions_and_unknown_topics_are_unrecognized() {
        for payload in [
            json!({ "action": "subscription.updated", "data": { "id": "1" } }),
            json!({ "topic": "chargebacks", "resource": "x" }),
            json!({ "hello": "world" }),
        ] {
            assert_eq!(
                MercadoPagoAdapter::extract_notification(&payload),
                MpNotification::Unrecognized
            );
        }
    }
}
