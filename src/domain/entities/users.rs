use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::users;

/// Customer row as the payment engine sees it: purchase history and cart are
/// JSONB documents owned by the user store.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = users)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub cart_data: Value,
    pub purchase_history: Value,
    pub created_at: DateTime<Utc>,
}
