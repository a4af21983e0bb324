use anyhow::{Context, Result};
use diesel::prelude::*;
use serde_json::Value;

use crate::domain::value_objects::products::{ProductModel, SizeStockModel};
use crate::infrastructure::postgres::schema::products;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = products)]
pub struct ProductEntity {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub available: bool,
    pub sizes: Value,
}

impl ProductEntity {
    pub fn to_model(self) -> Result<ProductModel> {
        let sizes: Vec<SizeStockModel> = serde_json::from_value(self.sizes)
            .context("product sizes column does not deserialize")?;

        Ok(ProductModel {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            available: self.available,
            sizes,
        })
    }
}
