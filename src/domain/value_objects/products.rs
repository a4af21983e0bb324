use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog view consumed by the stock effects. Stock is an explicit mapping
/// from size to quantity; sizes the product does not carry simply do not
/// appear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub available: bool,
    pub sizes: Vec<SizeStockModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizeStockModel {
    pub size: String,
    pub stock: i32,
}

impl ProductModel {
    pub fn stock_for_size(&self, size: &str) -> Option<i32> {
        self.sizes
            .iter()
            .find(|entry| entry.size == size)
            .map(|entry| entry.stock)
    }
}

/// One purchase appended to a customer's history after an approved payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRecordModel {
    pub products: Vec<PurchasedItemModel>,
    pub total: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchasedItemModel {
    pub product_id: String,
    pub size: Option<String>,
    pub quantity: u32,
}
