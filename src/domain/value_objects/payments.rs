use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{
    enums::{payment_providers::PaymentProvider, payment_statuses::PaymentStatus},
    money::Money,
    payment_errors::PaymentError,
};

/// The payment aggregate. It is the permanent ledger record of one
/// transaction: created PENDING alongside the provider call, mutated only by
/// webhook reconciliation or an explicit refund, never deleted.
#[derive(Debug, Clone)]
pub struct PaymentModel {
    pub id: Uuid,
    pub order_id: String,
    pub amount: Money,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    pub provider_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub metadata: PaymentMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    events: Vec<PaymentEvent>,
}

/// Everything the ledger keeps besides the core columns. `products` is the
/// authoritative line-item snapshot taken at creation time; stock effects
/// replay it regardless of later catalog changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentMetadata {
    #[serde(default)]
    pub products: Vec<ProductSnapshotModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_details: Option<RefundDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshotModel {
    pub product_id: String,
    pub size: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundDetails {
    pub id: Option<String>,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub status: PaymentStatus,
}

/// Domain events recorded by the aggregate for the side-effect pipeline. The
/// aggregate itself never touches inventory.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    PaymentApproved {
        payment_id: Uuid,
        order_id: String,
        amount: f64,
    },
    PaymentRefunded {
        payment_id: Uuid,
        refund_id: Option<String>,
    },
}

impl PaymentModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        order_id: String,
        amount: Money,
        status: PaymentStatus,
        provider: PaymentProvider,
        provider_payment_id: Option<String>,
        transaction_id: Option<String>,
        metadata: PaymentMetadata,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            amount,
            status,
            provider,
            provider_payment_id,
            transaction_id,
            metadata,
            created_at,
            updated_at,
            events: Vec::new(),
        }
    }

    /// PENDING -> APPROVED. The only legal entry into APPROVED.
    pub fn approve(&mut self) -> Result<(), PaymentError> {
        if self.status != PaymentStatus::Pending {
            return Err(PaymentError::InvalidStatus {
                current: self.status,
                required: PaymentStatus::Pending,
            });
        }
        self.status = PaymentStatus::Approved;
        self.updated_at = Utc::now();
        self.events.push(PaymentEvent::PaymentApproved {
            payment_id: self.id,
            order_id: self.order_id.clone(),
            amount: self.amount.amount(),
        });
        Ok(())
    }

    pub fn can_be_refunded(&self) -> bool {
        self.status == PaymentStatus::Approved
    }

    /// APPROVED -> REFUNDED, storing the refund details in metadata. One-shot:
    /// a second call fails because the payment is no longer refundable.
    pub fn mark_as_refunded(
        &mut self,
        refund_id: Option<String>,
        refund_amount: f64,
        processor_response: Option<Value>,
    ) -> Result<(), PaymentError> {
        if !self.can_be_refunded() {
            return Err(PaymentError::InvalidStatus {
                current: self.status,
                required: PaymentStatus::Approved,
            });
        }
        self.status = PaymentStatus::Refunded;
        self.updated_at = Utc::now();
        self.metadata.refund_details = Some(RefundDetails {
            id: refund_id.clone(),
            amount: refund_amount,
            date: Utc::now(),
            status: PaymentStatus::Refunded,
        });
        if processor_response.is_some() {
            self.metadata.processor_response = processor_response;
        }
        self.events.push(PaymentEvent::PaymentRefunded {
            payment_id: self.id,
            refund_id,
        });
        Ok(())
    }

    /// Records a reconciled status observed from the provider without firing
    /// domain events. Used for the REJECTED/CANCELLED paths and for anomalous
    /// transitions the reconciler has already decided to accept.
    pub fn apply_status(&mut self, status: PaymentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn take_events(&mut self) -> Vec<PaymentEvent> {
        std::mem::take(&mut self.events)
    }
}

// ---------------------------------------------------------------------------
// DTOs exchanged with the HTTP layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentModel {
    /// Client-supplied total. Accepted but never trusted; the recorded amount
    /// is always recomputed from the line items.
    pub amount: Option<f64>,
    pub currency: String,
    pub description: Option<String>,
    pub callback_url: Option<String>,
    pub customer_email: Option<String>,
    pub items: Vec<PaymentItemModel>,
    #[serde(default)]
    pub metadata: CreatePaymentMetadata,
    pub provider: PaymentProvider,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentMetadata {
    pub order_id: Option<String>,
    pub customer_id: Option<Uuid>,
    pub shipping_address: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentItemModel {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponseModel {
    pub id: Uuid,
    pub payment_id: Option<String>,
    pub status: PaymentStatus,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponseModel {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub provider: PaymentProvider,
    pub amount: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_response: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponseModel {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub refund_id: Option<String>,
    pub refund_amount: f64,
    pub refund_status: PaymentStatus,
}

// ---------------------------------------------------------------------------
// Provider-neutral shapes exchanged with the adapters
// ---------------------------------------------------------------------------

/// Request handed to an adapter's `create_payment`. The amount is the total
/// the orchestrator computed from the line items.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPaymentRequest {
    pub currency: String,
    pub description: Option<String>,
    pub callback_url: String,
    pub customer_email: Option<String>,
    pub external_reference: String,
    pub items: Vec<PaymentItemModel>,
    pub amount: f64,
    pub shipping_address: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ProviderPaymentOutcome {
    pub status: PaymentStatus,
    pub provider_payment_id: String,
    pub redirect_url: String,
    pub external_reference: String,
    pub amount: f64,
    pub processor_response: Value,
}

/// Whichever identifiers the caller has on hand. Adapters use what they need
/// and degrade gracefully when the preferred one is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentIds {
    pub transaction_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub order_id: Option<String>,
    pub payment_intent: Option<String>,
    pub refund_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundRequest {
    pub payment_ids: PaymentIds,
    /// Partial refund amount; `None` refunds the full payment.
    pub amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub status: PaymentStatus,
    pub refund_id: Option<String>,
    pub processor_response: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefundRecordModel {
    pub id: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub date_created: DateTime<Utc>,
    pub metadata: Value,
}

/// Raw webhook delivery as received at the HTTP boundary. Providers that sign
/// their payloads need the unparsed bytes for verification.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub raw_body: Vec<u8>,
    pub signature: Option<String>,
}

/// The single internal webhook event shape. Adapters normalize every provider
/// payload into this before it reaches the reconciler; no provider-specific
/// field is branched on outside an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventModel {
    pub provider: PaymentProvider,
    pub provider_payment_id: Option<String>,
    pub external_reference: Option<String>,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub raw: Value,
}
