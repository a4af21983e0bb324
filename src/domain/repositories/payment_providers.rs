use async_trait::async_trait;

use crate::domain::value_objects::{
    enums::payment_statuses::PaymentStatus,
    payment_errors::PaymentError,
    payments::{
        PaymentIds, ProviderPaymentOutcome, ProviderPaymentRequest, RefundOutcome,
        RefundRecordModel, RefundRequest, WebhookEventModel, WebhookRequest,
    },
};

/// Capability port over a payment provider. One concrete adapter per
/// provider; every wire format and status vocabulary is normalized behind
/// this trait and no provider-specific type leaks past it.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PaymentProviderAdapter: Send + Sync {
    /// Creates a redirect-based payment and returns the URL the buyer is sent
    /// to. Transport/API failures surface as `PaymentError::Provider`.
    async fn create_payment(
        &self,
        request: ProviderPaymentRequest,
    ) -> Result<ProviderPaymentOutcome, PaymentError>;

    /// Polls the provider for the current status. Absence of information is
    /// not an error for a status poll: when neither a direct lookup nor a
    /// search by correlation id finds anything, the answer is `Pending`.
    async fn get_payment_details(&self, ids: PaymentIds) -> Result<PaymentStatus, PaymentError>;

    /// Issues a refund. Each call carries a fresh idempotency token so a
    /// retried request cannot double-refund.
    async fn refund_payment(&self, request: RefundRequest) -> Result<RefundOutcome, PaymentError>;

    async fn get_refunds(&self, ids: PaymentIds) -> Result<Vec<RefundRecordModel>, PaymentError>;

    async fn get_refund(&self, ids: PaymentIds) -> Result<RefundRecordModel, PaymentError>;

    /// Normalizes a webhook delivery into zero or more events: zero when the
    /// payload is not a recognizable payment notification, several when an
    /// order-of-orders payload wraps multiple payments. Signature failures
    /// surface as `PaymentError::InvalidWebhookSignature`.
    async fn process_webhook(
        &self,
        request: WebhookRequest,
    ) -> Result<Vec<WebhookEventModel>, PaymentError>;
}
