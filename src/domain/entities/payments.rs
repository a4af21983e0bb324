use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::{payment_providers::PaymentProvider, payment_statuses::PaymentStatus},
    money::Money,
    payments::{PaymentMetadata, PaymentModel},
};
use crate::infrastructure::postgres::schema::payments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = payments)]
pub struct UpdatePaymentEntity {
    pub status: Option<String>,
    pub transaction_id: Option<String>,
    pub metadata: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentEntity {
    pub fn to_model(self) -> Result<PaymentModel> {
        let provider = PaymentProvider::from_str(&self.provider)
            .ok_or_else(|| anyhow!("unknown payment provider in ledger: {}", self.provider))?;
        let metadata: PaymentMetadata = serde_json::from_value(self.metadata)
            .context("payment metadata column does not deserialize")?;
        let amount =
            Money::new(self.amount, &self.currency).map_err(|err| anyhow!(err.to_string()))?;

        Ok(PaymentModel::new(
            self.id,
            self.order_id,
            amount,
            PaymentStatus::from_str(&self.status),
            provider,
            self.provider_payment_id,
            self.transaction_id,
            metadata,
            self.created_at,
            self.updated_at,
        ))
    }
}

impl UpdatePaymentEntity {
    /// Changeset that persists the mutable parts of a reconciled model.
    pub fn from_model(model: &PaymentModel) -> Result<Self> {
        Ok(Self {
            status: Some(model.status.as_str().to_string()),
            transaction_id: model.transaction_id.clone(),
            metadata: Some(serde_json::to_value(&model.metadata)?),
            updated_at: Some(model.updated_at),
        })
    }
}
