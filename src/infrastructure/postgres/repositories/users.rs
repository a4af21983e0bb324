use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use diesel::prelude::*;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    domain::{
        entities::users::UserEntity, repositories::users::UserRepository,
        value_objects::products::PurchaseRecordModel,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::users},
};

pub struct UserPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepository for UserPostgres {
    async fn append_purchase(&self, user_id: Uuid, purchase: PurchaseRecordModel) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = users::table
            .filter(users::id.eq(user_id))
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?
            .ok_or_else(|| anyhow!("user {} not found", user_id))?;

        let mut history: Vec<Value> = serde_json::from_value(entity.purchase_history)?;
        history.push(serde_json::to_value(&purchase)?);

        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set(users::purchase_history.eq(serde_json::to_value(&history)?))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set(users::cart_data.eq(json!({})))
            .execute(&mut conn)?;

        Ok(())
    }
}
