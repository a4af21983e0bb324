use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use diesel::prelude::*;

use crate::{
    domain::{
        entities::products::ProductEntity,
        repositories::products::ProductRepository,
        value_objects::products::{ProductModel, SizeStockModel},
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::products},
};

pub struct ProductPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ProductPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProductRepository for ProductPostgres {
    async fn find_by_id(&self, product_id: &str) -> Result<Option<ProductModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = products::table
            .filter(products::id.eq(product_id))
            .select(ProductEntity::as_select())
            .first::<ProductEntity>(&mut conn)
            .optional()?;

        entity.map(ProductEntity::to_model).transpose()
    }

    async fn update_size_stock(&self, product_id: &str, size: &str, stock: i32) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = products::table
            .filter(products::id.eq(product_id))
            .select(ProductEntity::as_select())
            .first::<ProductEntity>(&mut conn)
            .optional()?
            .ok_or_else(|| anyhow!("product {} not found", product_id))?;

        let mut sizes: Vec<SizeStockModel> = serde_json::from_value(entity.sizes)?;
        let slot = sizes
            .iter_mut()
            .find(|entry| entry.size == size)
            .ok_or_else(|| anyhow!("size {} not found for product {}", size, product_id))?;
        slot.stock = stock;

        diesel::update(products::table.filter(products::id.eq(product_id)))
            .set(products::sizes.eq(serde_json::to_value(&sizes)?))
            .execute(&mut conn)?;

        Ok(())
    }
}
