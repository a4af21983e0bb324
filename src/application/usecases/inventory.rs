use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    repositories::{products::ProductRepository, users::UserRepository},
    value_objects::{
        payments::ProductSnapshotModel,
        products::{PurchaseRecordModel, PurchasedItemModel},
    },
};

/// Side effects fired after reconciliation: stock mutation, purchase history
/// and cart clearing. Every item is processed best-effort so one bad line
/// never blocks the rest of an order.
pub struct StockEffects<P, U>
where
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    product_repository: Arc<P>,
    user_repository: Arc<U>,
}

impl<P, U> StockEffects<P, U>
where
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    pub fn new(product_repository: Arc<P>, user_repository: Arc<U>) -> Self {
        Self {
            product_repository,
            user_repository,
        }
    }

    /// Subtracts the purchased quantities from per-size stock. Items whose
    /// product or size no longer exists, or whose stock is already below the
    /// purchased quantity, are logged and skipped.
    pub async fn decrement_stock(&self, items: &[ProductSnapshotModel]) {
        for item in items {
            let size = match item.size.as_deref() {
                Some(size) => size,
                None => {
                    warn!(
                        product_id = %item.product_id,
                        "stock effects: item has no size, skipping decrement"
                    );
                    continue;
                }
            };

            let product = match self.product_repository.find_by_id(&item.product_id).await {
                Ok(Some(product)) => product,
                Ok(None) => {
                    warn!(
                        product_id = %item.product_id,
                        "stock effects: product not found, skipping decrement"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(
                        product_id = %item.product_id,
                        error = ?err,
                        "stock effects: product lookup failed, skipping decrement"
                    );
                    continue;
                }
            };

            let current = match product.stock_for_size(size) {
                Some(stock) => stock,
                None => {
                    warn!(
                        product_id = %item.product_id,
                        %size,
                        "stock effects: size not carried by product, skipping decrement"
                    );
                    continue;
                }
            };

            let quantity = item.quantity as i32;
            if current < quantity {
                warn!(
                    product_id = %item.product_id,
                    %size,
                    current,
                    quantity,
                    "stock effects: insufficient stock, skipping decrement"
                );
                continue;
            }

            if let Err(err) = self
                .product_repository
                .update_size_stock(&item.product_id, size, current - quantity)
                .await
            {
                warn!(
                    product_id = %item.product_id,
                    %size,
                    error = ?err,
                    "stock effects: stock decrement failed"
                );
            } else {
                info!(
                    product_id = %item.product_id,
                    %size,
                    new_stock = current - quantity,
                    "stock effects: stock decremented"
                );
            }
        }
    }

    /// Adds the purchased quantities back after a refund or cancellation.
    /// Unconditional: restoring never checks a floor.
    pub async fn restore_stock(&self, items: &[ProductSnapshotModel]) {
        for item in items {
            let size = match item.size.as_deref() {
                Some(size) => size,
                None => {
                    warn!(
                        product_id = %item.product_id,
                        "stock effects: item has no size, skipping restore"
                    );
                    continue;
                }
            };

            let product = match self.product_repository.find_by_id(&item.product_id).await {
                Ok(Some(product)) => product,
                Ok(None) => {
                    warn!(
                        product_id = %item.product_id,
                        "stock effects: product not found, skipping restore"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(
                        product_id = %item.product_id,
                        error = ?err,
                        "stock effects: product lookup failed, skipping restore"
                    );
                    continue;
                }
            };

            let current = match product.stock_for_size(size) {
                Some(stock) => stock,
                None => {
                    warn!(
                        product_id = %item.product_id,
                        %size,
                        "stock effects: size not carried by product, skipping restore"
                    );
                    continue;
                }
            };

            if let Err(err) = self
                .product_repository
                .update_size_stock(&item.product_id, size, current + item.quantity as i32)
                .await
            {
                warn!(
                    product_id = %item.product_id,
                    %size,
                    error = ?err,
                    "stock effects: stock restore failed"
                );
            }
        }
    }

    /// Appends the purchase to the customer's history and clears their cart.
    /// Guest checkouts have no customer id and produce no record.
    pub async fn record_purchase(
        &self,
        customer_id: Option<Uuid>,
        items: &[ProductSnapshotModel],
        total: f64,
    ) {
        let customer_id = match customer_id {
            Some(id) => id,
            None => {
                info!("stock effects: guest checkout, no purchase history to record");
                return;
            }
        };

        let purchase = PurchaseRecordModel {
            products: items
                .iter()
                .map(|item| PurchasedItemModel {
                    product_id: item.product_id.clone(),
                    size: item.size.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            total,
            date: Utc::now(),
        };

        if let Err(err) = self
            .user_repository
            .append_purchase(customer_id, purchase)
            .await
        {
            warn!(
                %customer_id,
                error = ?err,
                "stock effects: failed to append purchase history"
            );
        }

        if let Err(err) = self.user_repository.clear_cart(customer_id).await {
            warn!(
                %customer_id,
                error = ?err,
                "stock effects: failed to clear cart"
            );
        }
    }
}
