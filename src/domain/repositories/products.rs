use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::products::ProductModel;

/// Product store collaborator. The payment engine only reads products and
/// writes per-size stock levels.
#[async_trait]
#[automock]
pub trait ProductRepository {
    async fn find_by_id(&self, product_id: &str) -> Result<Option<ProductModel>>;
    async fn update_size_stock(&self, product_id: &str, size: &str, stock: i32) -> Result<()>;
}
