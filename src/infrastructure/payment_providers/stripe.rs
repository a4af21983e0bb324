use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
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

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com";

/// Stripe adapter: checkout-session flow with HMAC-signed webhooks. The
/// session carries the order id in its metadata so reconciliation can fall
/// back to the external reference when the session id is not yet stored.
pub struct StripeAdapter {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    type_: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    status: String,
    created: i64,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StripeRefundList {
    #[serde(default)]
    data: Vec<StripeRefund>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    code: Option<String>,
    message: Option<String>,
}

impl StripeAdapter {
    pub fn new(stripe: &config_model::Stripe) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: stripe.secret_key.clone(),
            webhook_secret: stripe.webhook_secret.clone(),
        }
    }

    fn provider_error(message: impl std::fmt::Display) -> PaymentError {
        PaymentError::provider(PaymentProvider::Stripe, message)
    }

    async fn read_failure(resp: reqwest::Response, context: &str) -> (String, Option<String>) {
        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (code, message) = match serde_json::from_str::<StripeErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (None, None),
        };

        error!(
            status = %status,
            stripe_error_code = ?code,
            stripe_error_message = ?message,
            response_body = %body,
            context = %context,
            "stripe api request failed"
        );

        (
            message.unwrap_or_else(|| format!("{context} failed with status {status}")),
            code,
        )
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let (message, _) = Self::read_failure(resp, context).await;
        Err(Self::provider_error(message))
    }

    /// Event-type translation, the only place Stripe vocabulary is read.
    fn map_event_type(event_type: &str) -> PaymentStatus {
        match event_type {
            "payment_intent.succeeded" | "charge.succeeded" | "checkout.session.completed" => {
                PaymentStatus::Approved
            }
            "payment_intent.payment_failed" | "charge.failed" => PaymentStatus::Rejected,
            "payment_intent.canceled" | "checkout.session.expired" => PaymentStatus::Cancelled,
            "charge.refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }

    fn map_session_status(session_status: &str) -> PaymentStatus {
        match session_status {
            "complete" => PaymentStatus::Approved,
            "expired" => PaymentStatus::Cancelled,
            // "open" and anything unrecognized
            _ => PaymentStatus::Pending,
        }
    }

    fn map_refund_status(status: &str) -> PaymentStatus {
        match status {
            "succeeded" => PaymentStatus::Approved,
            "failed" => PaymentStatus::Rejected,
            "canceled" => PaymentStatus::Cancelled,
            // "pending" and anything unrecognized
            _ => PaymentStatus::Pending,
        }
    }

    /// Verifies the `Stripe-Signature` header (`t=..,v1=..`) against an
    /// HMAC-SHA256 of `"{t}.{raw_body}"` keyed with the webhook secret.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, PaymentError> {
        let invalid = || PaymentError::InvalidWebhookSignature {
            provider: PaymentProvider::Stripe.to_string(),
        };

        let mut timestamp: Option<&str> = None;
        let mut signature: Option<&str> = None;
        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest);
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest);
            }
        }

        let timestamp = timestamp.ok_or_else(invalid)?;
        let signature = signature.ok_or_else(invalid)?;

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| invalid())?;
        mac.update(signed_payload.as_bytes());
        let provided = hex::decode(signature).map_err(|_| invalid())?;
        // Constant-time comparison via the Mac trait.
        mac.verify_slice(&provided).map_err(|_| invalid())?;

        serde_json::from_slice(payload).map_err(|_| invalid())
    }

    fn normalize_refund(refund: &StripeRefund) -> RefundRecordModel {
        RefundRecordModel {
            id: refund.id.clone(),
            amount: refund.amount as f64 / 100.0,
            status: Self::map_refund_status(&refund.status),
            date_created: DateTime::<Utc>::from_timestamp(refund.created, 0)
                .unwrap_or_else(Utc::now),
            metadata: refund.metadata.clone().unwrap_or(Value::Null),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        body: &[(String, String)],
        idempotency_key: Option<String>,
        context: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        let mut request = self
            .http
            .post(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        request.send().await.map_err(|err| {
            error!(context = %context, error = %err, "stripe transport failure");
            Self::provider_error(err)
        })
    }
}

#[async_trait]
impl PaymentProviderAdapter for StripeAdapter {
    async fn create_payment(
        &self,
        request: ProviderPaymentRequest,
    ) -> Result<ProviderPaymentOutcome, PaymentError> {
        let mut body: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            (
                "success_url".to_string(),
                format!("{}/success", request.callback_url),
            ),
            (
                "cancel_url".to_string(),
                format!("{}/cancel", request.callback_url),
            ),
            (
                "metadata[orderId]".to_string(),
                request.external_reference.clone(),
            ),
        ];

        if let Some(email) = &request.customer_email {
            body.push(("customer_email".to_string(), email.clone()));
        }
        if let Some(address) = &request.shipping_address {
            body.push(("metadata[shippingAddress]".to_string(), address.to_string()));
        }

        for (idx, item) in request.items.iter().enumerate() {
            let prefix = format!("line_items[{idx}]");
            body.push((
                format!("{prefix}[price_data][currency]"),
                request.currency.to_lowercase(),
            ));
            body.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.title.clone(),
            ));
            if let Some(description) = &item.description {
                body.push((
                    format!("{prefix}[price_data][product_data][description]"),
                    description.clone(),
                ));
            }
            body.push((
                format!("{prefix}[price_data][unit_amount]"),
                ((item.unit_price * 100.0).round() as i64).to_string(),
            ));
            body.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }

        info!(
            external_reference = %request.external_reference,
            item_count = request.items.len(),
            "stripe: creating checkout session"
        );

        let resp = self
            .post_form("/v1/checkout/sessions", &body, None, "create checkout session")
            .await?;
        let resp = Self::ensure_success(resp, "create checkout session").await?;

        let raw = resp.json::<Value>().await.map_err(Self::provider_error)?;
        let session: CheckoutSessionResponse =
            serde_json::from_value(raw.clone()).map_err(Self::provider_error)?;
        let redirect_url = session
            .url
            .ok_or_else(|| Self::provider_error("checkout session URL is missing"))?;

        Ok(ProviderPaymentOutcome {
            status: PaymentStatus::Pending,
            provider_payment_id: session.id,
            redirect_url,
            external_reference: request.external_reference,
            amount: request.amount,
            processor_response: raw,
        })
    }

    async fn get_payment_details(&self, ids: PaymentIds) -> Result<PaymentStatus, PaymentError> {
        let session_id = ids.provider_payment_id.as_deref().ok_or_else(|| {
            PaymentError::Validation("providerPaymentId is required for a status poll".to_string())
        })?;

        info!(%session_id, "stripe: retrieving checkout session");
        let resp = self
            .http
            .get(format!("{API_BASE}/v1/checkout/sessions/{session_id}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await
            .map_err(Self::provider_error)?;

        if !resp.status().is_success() {
            // Absence of information is not an error for a status poll.
            let (message, _) = Self::read_failure(resp, "retrieve checkout session").await;
            warn!(%session_id, %message, "stripe: session lookup failed, reporting PENDING");
            return Ok(PaymentStatus::Pending);
        }

        let session = resp.json::<Value>().await.map_err(Self::provider_error)?;
        let status = session
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("open");

        Ok(Self::map_session_status(status))
    }

    async fn refund_payment(&self, request: RefundRequest) -> Result<RefundOutcome, PaymentError> {
        let payment_intent = request.payment_ids.payment_intent.as_deref().ok_or_else(|| {
            PaymentError::Validation("payment intent is required for a refund".to_string())
        })?;

        let mut body = vec![("payment_intent".to_string(), payment_intent.to_string())];
        if let Some(amount) = request.amount {
            body.push((
                "amount".to_string(),
                ((amount * 100.0).round() as i64).to_string(),
            ));
        }

        info!(%payment_intent, amount = ?request.amount, "stripe: requesting refund");

        let resp = self
            .post_form(
                "/v1/refunds",
                &body,
                Some(Uuid::new_v4().to_string()),
                "create refund",
            )
            .await?;

        if !resp.status().is_success() {
            let (message, code) = Self::read_failure(resp, "create refund").await;
            // A charge that was already refunded out-of-band is a terminal
            // success, not a failure to surface to the caller.
            if code.as_deref() == Some("charge_already_refunded") {
                return Ok(RefundOutcome {
                    status: PaymentStatus::Refunded,
                    refund_id: None,
                    processor_response: serde_json::json!({ "message": message }),
                });
            }
            return Err(Self::provider_error(message));
        }

        let raw = resp.json::<Value>().await.map_err(Self::provider_error)?;
        let refund: StripeRefund =
            serde_json::from_value(raw.clone()).map_err(Self::provider_error)?;

        Ok(RefundOutcome {
            status: Self::map_refund_status(&refund.status),
            refund_id: Some(refund.id),
            processor_response: raw,
        })
    }

    async fn get_refunds(&self, ids: PaymentIds) -> Result<Vec<RefundRecordModel>, PaymentError> {
        let payment_intent = ids.payment_intent.as_deref().ok_or_else(|| {
            PaymentError::Validation("payment intent is required to list refunds".to_string())
        })?;

        let resp = self
            .http
            .get(format!(
                "{API_BASE}/v1/refunds?payment_intent={payment_intent}&limit=100"
            ))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await
            .map_err(Self::provider_error)?;
        let resp = Self::ensure_success(resp, "list refunds").await?;

        let list: StripeRefundList = resp.json().await.map_err(Self::provider_error)?;
        Ok(list.data.iter().map(Self::normalize_refund).collect())
    }

    async fn get_refund(&self, ids: PaymentIds) -> Result<RefundRecordModel, PaymentError> {
        let refund_id = ids.refund_id.as_deref().ok_or_else(|| {
            PaymentError::Validation("refundId must be provided".to_string())
        })?;

        let resp = self
            .http
            .get(format!("{API_BASE}/v1/refunds/{refund_id}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await
            .map_err(Self::provider_error)?;
        let resp = Self::ensure_success(resp, "get refund").await?;

        let refund: StripeRefund = resp.json().await.map_err(Self::provider_error)?;

        if let (Some(expected), Some(actual)) =
            (ids.payment_intent.as_deref(), refund.payment_intent.as_deref())
        {
            if expected != actual {
                return Err(Self::provider_error(format!(
                    "refund {refund_id} does not belong to payment intent {expected}"
                )));
            }
        }

        Ok(Self::normalize_refund(&refund))
    }

    async fn process_webhook(
        &self,
        request: WebhookRequest,
    ) -> Result<Vec<WebhookEventModel>, PaymentError> {
        let signature = request.signature.as_deref().ok_or_else(|| {
            warn!("stripe: webhook received without a signature header");
            PaymentError::InvalidWebhookSignature {
                provider: PaymentProvider::Stripe.to_string(),
            }
        })?;

        let event = self.verify_webhook_signature(&request.raw_body, signature)?;
        info!(event_type = %event.type_, "stripe: webhook verified");

        let object = &event.data.object;
        let provider_payment_id = object
            .get("id")
            .and_then(Value::as_str)
            .map(String::from);
        let external_reference = object
            .pointer("/metadata/orderId")
            .and_then(Value::as_str)
            .map(String::from);
        let transaction_id = object
            .get("payment_intent")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(vec![WebhookEventModel {
            provider: PaymentProvider::Stripe,
            provider_payment_id,
            external_reference,
            transaction_id,
            status: Self::map_event_type(&event.type_),
            raw: event.data.object,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_adapter() -> StripeAdapter {
        StripeAdapter::new(&config_model::Stripe {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_testsecret".to_string(),
        })
    }

    fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, String::from_utf8_lossy(payload)).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn maps_event_types_to_canonical_statuses() {
        let cases = [
            ("payment_intent.succeeded", PaymentStatus::Approved),
            ("charge.succeeded", PaymentStatus::Approved),
            ("checkout.session.completed", PaymentStatus::Approved),
            ("payment_intent.payment_failed", PaymentStatus::Rejected),
            ("charge.failed", PaymentStatus::Rejected),
            ("payment_intent.canceled", PaymentStatus::Cancelled),
            ("checkout.session.expired", PaymentStatus::Cancelled),
            ("charge.refunded", PaymentStatus::Refunded),
            ("customer.created", PaymentStatus::Pending),
        ];
        for (input, expected) in cases {
            assert_eq!(StripeAdapter::map_event_type(input), expected, "{input}");
        }
    }

    #[test]
    fn maps_refund_statuses() {
        assert_eq!(
            StripeAdapter::map_refund_status("succeeded"),
            PaymentStatus::Approved
        );
        assert_eq!(
            StripeAdapter::map_refund_status("pending"),
            PaymentStatus::Pending
        );
        assert_eq!(
            StripeAdapter::map_refund_status("failed"),
            PaymentStatus::Rejected
        );
        assert_eq!(
            StripeAdapter::map_refund_status("canceled"),
            PaymentStatus::Cancelled
        );
        assert_eq!(
            StripeAdapter::map_refund_status("mystery"),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn accepts_a_correctly_signed_webhook() {
        let adapter = sample_adapter();
        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "metadata": { "orderId": "ORDER-1" } } }
        })
        .to_string();

        let signature = sign("whsec_testsecret", "1700000000", payload.as_bytes());
        let header = format!("t=1700000000,v1={signature}");

        let event = adapter
            .verify_webhook_signature(payload.as_bytes(), &header)
            .unwrap();
        assert_eq!(event.type_, "checkout.session.completed");
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let adapter = sample_adapter();
        let payload = br#"{"type":"charge.succeeded","data":{"object":{}}}"#;

        let signature = sign("whsec_testsecret", "1700000000", payload);
        let header = format!("t=1700000000,v1={signature}");

        let tampered = br#"{"type":"charge.refunded","data":{"object":{}}}"#;
        let err = adapter
            .verify_webhook_signature(tampered, &header)
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidWebhookSignature { .. }
        ));
    }

    #[test]
    fn rejects_a_signature_signed_with_the_wrong_secret() {
        let adapter = sample_adapter();
        let payload = br#"{"type":"charge.succeeded","data":{"object":{}}}"#;

        let signature = sign("whsec_othersecret", "1700000000", payload);
        let header = format!("t=1700000000,v1={signature}");

        assert!(adapter
            .verify_webhook_signature(payload, &header)
            .is_err());
    }

    #[test]
    fn rejects_malformed_signature_headers() {
        let adapter = sample_adapter();
        let payload = b"{}";

        for header in ["", "t=123", "v1=abc", "nonsense"] {
            assert!(
                adapter.verify_webhook_signature(payload, header).is_err(),
                "{header}"
            );
        }
    }
}
