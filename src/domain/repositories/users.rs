use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::products::PurchaseRecordModel;

/// Customer store collaborator: purchase history append and cart clearing
/// after an approved payment.
#[async_trait]
#[automock]
pub trait UserRepository {
    async fn append_purchase(&self, user_id: Uuid, purchase: PurchaseRecordModel) -> Result<()>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<()>;
}
