use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::{InsertPaymentEntity, PaymentEntity, UpdatePaymentEntity};

/// Persistence boundary for the payment ledger. `order_id` carries a unique
/// index; the secondary lookups back the webhook reconciliation precedence.
#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn create(&self, payment: InsertPaymentEntity) -> Result<PaymentEntity>;
    async fn update(&self, id: Uuid, changes: UpdatePaymentEntity) -> Result<PaymentEntity>;
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentEntity>>;
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
        provider: &str,
    ) -> Result<Option<PaymentEntity>>;
    async fn find_by_transaction_id(&self, transaction_id: &str)
    -> Result<Option<PaymentEntity>>;
}
