use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    domain::{
        entities::payments::{InsertPaymentEntity, PaymentEntity, UpdatePaymentEntity},
        repositories::{
            payments::PaymentRepository, products::ProductRepository, users::UserRepository,
        },
        value_objects::{
            enums::{payment_providers::PaymentProvider, payment_statuses::PaymentStatus},
            money::Money,
            payment_errors::PaymentError,
            payments::{
                CreatePaymentModel, CreatePaymentResponseModel, PaymentEvent, PaymentIds,
                PaymentMetadata, PaymentModel, PaymentStatusResponseModel, ProductSnapshotModel,
                ProviderPaymentRequest, RefundDetails, RefundRecordModel, RefundRequest,
                RefundResponseModel, WebhookEventModel, WebhookRequest,
            },
        },
    },
    infrastructure::payment_providers::factory::ProviderFactory,
};

use super::inventory::StockEffects;

const ORDER_ID_ATTEMPTS: usize = 5;

/// The orchestration surface: one entry point per API operation plus the
/// webhook reconciler. The ledger is the source of truth; the provider is
/// consulted, never trusted over a recorded refund.
pub struct PaymentUseCase<R, P, U>
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    payment_repository: Arc<R>,
    stock_effects: StockEffects<P, U>,
    providers: Arc<ProviderFactory>,
}

impl<R, P, U> PaymentUseCase<R, P, U>
where
    R: PaymentRepository + Send + Sync,
    P: ProductRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    pub fn new(
        payment_repository: Arc<R>,
        stock_effects: StockEffects<P, U>,
        providers: Arc<ProviderFactory>,
    ) -> Self {
        Self {
            payment_repository,
            stock_effects,
            providers,
        }
    }

    pub async fn create_payment(
        &self,
        dto: CreatePaymentModel,
    ) -> Result<CreatePaymentResponseModel, PaymentError> {
        let callback_url = dto
            .callback_url
            .clone()
            .ok_or_else(|| PaymentError::Validation("callbackUrl is required".to_string()))?;
        if dto.items.is_empty() {
            return Err(PaymentError::Validation(
                "at least one item is required".to_string(),
            ));
        }

        // The recorded total is always recomputed from the line items; a
        // client-supplied amount is logged when it disagrees and ignored.
        let mut total: Option<Money> = None;
        for item in &dto.items {
            let line = Money::new(item.unit_price, &dto.currency)?
                .multiply(f64::from(item.quantity))?;
            total = Some(match total {
                Some(sum) => sum.add(&line)?,
                None => line,
            });
        }
        let total = total.ok_or_else(|| {
            PaymentError::Validation("at least one item is required".to_string())
        })?;

        if let Some(client_amount) = dto.amount {
            if (client_amount - total.amount()).abs() > 1e-9 {
                warn!(
                    client_amount,
                    computed_amount = total.amount(),
                    "create payment: client total disagrees with line items, using computed total"
                );
            }
        }

        let order_id = self.resolve_order_id(dto.metadata.order_id.clone()).await?;

        let products: Vec<ProductSnapshotModel> = dto
            .items
            .iter()
            .map(|item| ProductSnapshotModel {
                product_id: item.id.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        info!(
            %order_id,
            provider = %dto.provider,
            amount = total.amount(),
            currency = %total.currency(),
            "create payment: requesting redirect from provider"
        );

        let adapter = self.providers.resolve(dto.provider);
        let outcome = adapter
            .create_payment(ProviderPaymentRequest {
                currency: total.currency().to_string(),
                description: dto.description.clone(),
                callback_url,
                customer_email: dto.customer_email.clone(),
                external_reference: order_id.clone(),
                items: dto.items.clone(),
                amount: total.amount(),
                shipping_address: dto.metadata.shipping_address.clone(),
            })
            .await?;

        let metadata = PaymentMetadata {
            products,
            customer_id: dto.metadata.customer_id,
            shipping_address: dto.metadata.shipping_address.clone(),
            processor_response: Some(outcome.processor_response.clone()),
            ..Default::default()
        };

        let created = self
            .payment_repository
            .create(InsertPaymentEntity {
                order_id: order_id.clone(),
                amount: total.amount(),
                currency: total.currency().to_string(),
                status: outcome.status.as_str().to_string(),
                provider: dto.provider.as_str().to_string(),
                provider_payment_id: Some(outcome.provider_payment_id.clone()),
                transaction_id: None,
                metadata: serde_json::to_value(&metadata).map_err(anyhow::Error::from)?,
            })
            .await
            .map_err(|err| {
                error!(%order_id, db_error = ?err, "create payment: failed to persist ledger record");
                PaymentError::Internal(err)
            })?;

        info!(%order_id, payment_id = %created.id, "create payment: ledger record created");

        Ok(CreatePaymentResponseModel {
            id: created.id,
            payment_id: Some(outcome.provider_payment_id),
            status: outcome.status,
            redirect_url: outcome.redirect_url,
        })
    }

    pub async fn get_payment_status(
        &self,
        order_id: &str,
    ) -> Result<PaymentStatusResponseModel, PaymentError> {
        let mut payment = self.load_by_order_id(order_id).await?;

        // A recorded refund is final; the provider is not consulted again.
        if payment.metadata.refund_details.is_some() {
            info!(%order_id, "payment status: refund recorded locally, serving ledger record");
            return Ok(Self::status_response(&payment));
        }

        let adapter = self.providers.resolve(payment.provider);
        let polled = adapter.get_payment_details(Self::payment_ids(&payment)).await?;

        if polled != payment.status {
            info!(
                %order_id,
                from = %payment.status,
                to = %polled,
                "payment status: provider reports a newer status, updating ledger"
            );
            payment.apply_status(polled);
            self.persist(&payment).await?;
        }

        Ok(Self::status_response(&payment))
    }

    pub async fn refund_payment(
        &self,
        order_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundResponseModel, PaymentError> {
        let mut payment = self.load_by_order_id(order_id).await?;

        if !payment.can_be_refunded() {
            return Err(PaymentError::InvalidStatus {
                current: payment.status,
                required: PaymentStatus::Approved,
            });
        }

        if let Some(requested) = amount {
            let requested = Money::new(requested, payment.amount.currency())?;
            if requested.amount() > payment.amount.amount() {
                return Err(PaymentError::Validation(
                    "refund amount exceeds the payment total".to_string(),
                ));
            }
        }

        info!(%order_id, requested_amount = ?amount, "refund: requesting refund from provider");

        let adapter = self.providers.resolve(payment.provider);
        let outcome = adapter
            .refund_payment(RefundRequest {
                payment_ids: Self::payment_ids(&payment),
                amount,
            })
            .await?;

        if !matches!(
            outcome.status,
            PaymentStatus::Approved | PaymentStatus::Pending | PaymentStatus::Refunded
        ) {
            return Err(PaymentError::provider(
                payment.provider,
                format!("refund was not accepted, provider reported {}", outcome.status),
            ));
        }

        let refund_amount = amount.unwrap_or_else(|| payment.amount.amount());
        payment.mark_as_refunded(
            outcome.refund_id.clone(),
            refund_amount,
            Some(outcome.processor_response.clone()),
        )?;

        for event in payment.take_events() {
            if let PaymentEvent::PaymentRefunded { refund_id, .. } = event {
                info!(%order_id, ?refund_id, "refund: restoring stock for refunded order");
                self.stock_effects
                    .restore_stock(&payment.metadata.products)
                    .await;
            }
        }

        self.persist(&payment).await?;

        Ok(RefundResponseModel {
            id: payment.id,
            status: payment.status,
            refund_id: outcome.refund_id,
            refund_amount,
            refund_status: outcome.status,
        })
    }

    pub async fn get_refunds(
        &self,
        order_id: &str,
    ) -> Result<Vec<RefundRecordModel>, PaymentError> {
        let mut payment = self.load_by_order_id(order_id).await?;

        let adapter = self.providers.resolve(payment.provider);
        let refunds = adapter.get_refunds(Self::payment_ids(&payment)).await?;

        // A refund issued out-of-band (provider dashboard) reaches the ledger
        // here: backfill from the newest record.
        if payment.metadata.refund_details.is_none() {
            if let Some(newest) = refunds
                .iter()
                .max_by_key(|refund| refund.date_created)
                .cloned()
            {
                warn!(
                    %order_id,
                    refund_id = %newest.id,
                    "refunds: provider reports a refund the ledger missed, backfilling"
                );
                if payment.can_be_refunded() {
                    payment.mark_as_refunded(Some(newest.id.clone()), newest.amount, None)?;
                    for event in payment.take_events() {
                        if matches!(event, PaymentEvent::PaymentRefunded { .. }) {
                            self.stock_effects
                                .restore_stock(&payment.metadata.products)
                                .await;
                        }
                    }
                } else {
                    payment.metadata.refund_details = Some(RefundDetails {
                        id: Some(newest.id.clone()),
                        amount: newest.amount,
                        date: newest.date_created,
                        status: PaymentStatus::Refunded,
                    });
                    payment.apply_status(PaymentStatus::Refunded);
                }
                self.persist(&payment).await?;
            }
        }

        Ok(refunds)
    }

    pub async fn get_refund(
        &self,
        order_id: &str,
        refund_id: &str,
    ) -> Result<RefundRecordModel, PaymentError> {
        let payment = self.load_by_order_id(order_id).await?;

        // No locally recorded refund means nothing to look up for this order.
        let details = payment
            .metadata
            .refund_details
            .as_ref()
            .ok_or(PaymentError::NotFound)?;

        let mut ids = Self::payment_ids(&payment);
        ids.refund_id = if refund_id.is_empty() {
            details.id.clone()
        } else {
            Some(refund_id.to_string())
        };

        let adapter = self.providers.resolve(payment.provider);
        adapter.get_refund(ids).await
    }

    /// Normalizes the delivery through the provider's adapter and reconciles
    /// every emitted event independently. One failing event does not stop the
    /// rest; the first failure is reported after all are attempted.
    pub async fn process_webhook(
        &self,
        provider: PaymentProvider,
        request: WebhookRequest,
    ) -> Result<(), PaymentError> {
        let adapter = self.providers.resolve(provider);
        let events = adapter.process_webhook(request).await?;

        if events.is_empty() {
            info!(%provider, "webhook: no payment events in delivery");
            return Ok(());
        }

        let mut first_error = None;
        for event in events {
            if let Err(err) = self.update_payment_from_webhook(event).await {
                error!(%provider, error = %err, "webhook: failed to reconcile event");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn update_payment_from_webhook(
        &self,
        event: WebhookEventModel,
    ) -> Result<(), PaymentError> {
        let mut payment = self.locate_for_event(&event).await?;

        if payment.status == event.status {
            info!(
                order_id = %payment.order_id,
                status = %payment.status,
                "webhook: status already recorded, skipping duplicate delivery"
            );
            return Ok(());
        }

        if payment.transaction_id.is_none() && event.transaction_id.is_some() {
            payment.transaction_id = event.transaction_id.clone();
        }

        let previous = payment.status;
        let amount = payment.amount.amount();

        match event.status {
            PaymentStatus::Approved => {
                if previous == PaymentStatus::Pending {
                    payment.approve()?;
                } else {
                    warn!(
                        order_id = %payment.order_id,
                        %previous,
                        reconciliation_anomaly = true,
                        "webhook: APPROVED arrived for a non-pending payment, reconciling anyway"
                    );
                    payment.apply_status(PaymentStatus::Approved);
                }
            }
            PaymentStatus::Refunded => {
                if previous == PaymentStatus::Approved {
                    payment.mark_as_refunded(None, amount, None)?;
                } else {
                    warn!(
                        order_id = %payment.order_id,
                        %previous,
                        reconciliation_anomaly = true,
                        "webhook: REFUNDED arrived before an approval was recorded, \
                         recording status without restoring stock"
                    );
                    payment.apply_status(PaymentStatus::Refunded);
                }
            }
            other => payment.apply_status(other),
        }
        payment.metadata.webhook_data = Some(event.raw);

        for fired in payment.take_events() {
            match fired {
                PaymentEvent::PaymentApproved { order_id, amount, .. } => {
                    info!(%order_id, amount, "webhook: payment approved, applying order side effects");
                    self.stock_effects
                        .decrement_stock(&payment.metadata.products)
                        .await;
                    self.stock_effects
                        .record_purchase(payment.metadata.customer_id, &payment.metadata.products, amount)
                        .await;
                }
                PaymentEvent::PaymentRefunded { .. } => {
                    self.stock_effects
                        .restore_stock(&payment.metadata.products)
                        .await;
                }
            }
        }

        // Transitions that bypass the aggregate's event path still carry
        // their inventory consequences.
        if event.status == PaymentStatus::Approved && previous != PaymentStatus::Pending {
            self.stock_effects
                .decrement_stock(&payment.metadata.products)
                .await;
            self.stock_effects
                .record_purchase(payment.metadata.customer_id, &payment.metadata.products, amount)
                .await;
        }
        if event.status == PaymentStatus::Cancelled && previous == PaymentStatus::Approved {
            self.stock_effects
                .restore_stock(&payment.metadata.products)
                .await;
        }

        self.persist(&payment).await?;

        info!(
            order_id = %payment.order_id,
            from = %previous,
            to = %payment.status,
            "webhook: payment reconciled"
        );
        Ok(())
    }

    /// Reconciliation lookup: provider payment id, then external reference,
    /// then transaction id. First match wins.
    async fn locate_for_event(
        &self,
        event: &WebhookEventModel,
    ) -> Result<PaymentModel, PaymentError> {
        let mut entity: Option<PaymentEntity> = None;

        if let Some(provider_payment_id) = event.provider_payment_id.as_deref() {
            entity = self
                .payment_repository
                .find_by_provider_payment_id(provider_payment_id, event.provider.as_str())
                .await
                .map_err(|err| {
                    error!(%provider_payment_id, db_error = ?err, "webhook: provider payment id lookup failed");
                    PaymentError::Internal(err)
                })?;
        }

        if entity.is_none() {
            if let Some(order_id) = event.external_reference.as_deref() {
                entity = self
                    .payment_repository
                    .find_by_order_id(order_id)
                    .await
                    .map_err(|err| {
                        error!(%order_id, db_error = ?err, "webhook: order id lookup failed");
                        PaymentError::Internal(err)
                    })?;
            }
        }

        if entity.is_none() {
            if let Some(transaction_id) = event.transaction_id.as_deref() {
                entity = self
                    .payment_repository
                    .find_by_transaction_id(transaction_id)
                    .await
                    .map_err(|err| {
                        error!(%transaction_id, db_error = ?err, "webhook: transaction id lookup failed");
                        PaymentError::Internal(err)
                    })?;
            }
        }

        match entity {
            Some(entity) => entity.to_model().map_err(PaymentError::Internal),
            None => {
                warn!(
                    provider = %event.provider,
                    provider_payment_id = ?event.provider_payment_id,
                    external_reference = ?event.external_reference,
                    transaction_id = ?event.transaction_id,
                    "webhook: no ledger record matches this event"
                );
                Err(PaymentError::NotFound)
            }
        }
    }

    async fn resolve_order_id(&self, requested: Option<String>) -> Result<String, PaymentError> {
        if let Some(order_id) = requested {
            let existing = self
                .payment_repository
                .find_by_order_id(&order_id)
                .await
                .map_err(|err| {
                    error!(%order_id, db_error = ?err, "create payment: order id lookup failed");
                    PaymentError::Internal(err)
                })?;
            if existing.is_some() {
                return Err(PaymentError::DuplicateOrder(order_id));
            }
            return Ok(order_id);
        }

        for _ in 0..ORDER_ID_ATTEMPTS {
            let candidate = format!("ORDER-{}", Uuid::new_v4());
            let existing = self
                .payment_repository
                .find_by_order_id(&candidate)
                .await
                .map_err(|err| {
                    error!(db_error = ?err, "create payment: order id lookup failed");
                    PaymentError::Internal(err)
                })?;
            if existing.is_none() {
                return Ok(candidate);
            }
        }

        Err(PaymentError::Internal(anyhow::anyhow!(
            "could not generate a unique order id after {ORDER_ID_ATTEMPTS} attempts"
        )))
    }

    async fn load_by_order_id(&self, order_id: &str) -> Result<PaymentModel, PaymentError> {
        let entity = self
            .payment_repository
            .find_by_order_id(order_id)
            .await
            .map_err(|err| {
                error!(%order_id, db_error = ?err, "payment lookup failed");
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::NotFound)?;
        entity.to_model().map_err(PaymentError::Internal)
    }

    async fn persist(&self, payment: &PaymentModel) -> Result<(), PaymentError> {
        let changes = UpdatePaymentEntity::from_model(payment).map_err(PaymentError::Internal)?;
        self.payment_repository
            .update(payment.id, changes)
            .await
            .map_err(|err| {
                error!(
                    order_id = %payment.order_id,
                    db_error = ?err,
                    "failed to persist payment update"
                );
                PaymentError::Internal(err)
            })?;
        Ok(())
    }

    fn payment_ids(payment: &PaymentModel) -> PaymentIds {
        PaymentIds {
            transaction_id: payment.transaction_id.clone(),
            provider_payment_id: payment.provider_payment_id.clone(),
            order_id: Some(payment.order_id.clone()),
            payment_intent: payment
                .metadata
                .webhook_data
                .as_ref()
                .and_then(|data| data.get("payment_intent"))
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| payment.transaction_id.clone()),
            refund_id: payment
                .metadata
                .refund_details
                .as_ref()
                .and_then(|details| details.id.clone()),
        }
    }

    fn status_response(payment: &PaymentModel) -> PaymentStatusResponseModel {
        PaymentStatusResponseModel {
            id: payment.id,
            status: payment.status,
            order_id: payment.order_id.clone(),
            transaction_id: payment.transaction_id.clone(),
            provider_payment_id: payment.provider_payment_id.clone(),
            provider: payment.provider,
            amount: payment.amount.amount(),
            currency: payment.amount.currency().to_string(),
            created_at: payment.created_at,
            processor_response: payment.metadata.processor_response.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::domain::{
        repositories::{
            payment_providers::MockPaymentProviderAdapter, payments::MockPaymentRepository,
            products::MockProductRepository, users::MockUserRepository,
        },
        value_objects::{
            payments::{CreatePaymentMetadata, PaymentItemModel, ProviderPaymentOutcome, RefundOutcome},
            products::{ProductModel, SizeStockModel},
        },
    };

    type TestUseCase =
        PaymentUseCase<MockPaymentRepository, MockProductRepository, MockUserRepository>;

    struct Mocks {
        payment_repo: MockPaymentRepository,
        product_repo: MockProductRepository,
        user_repo: MockUserRepository,
        mercado_pago: MockPaymentProviderAdapter,
        stripe: MockPaymentProviderAdapter,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                payment_repo: MockPaymentRepository::new(),
                product_repo: MockProductRepository::new(),
                user_repo: MockUserRepository::new(),
                mercado_pago: MockPaymentProviderAdapter::new(),
                stripe: MockPaymentProviderAdapter::new(),
            }
        }

        fn build(self) -> TestUseCase {
            PaymentUseCase::new(
                Arc::new(self.payment_repo),
                StockEffects::new(Arc::new(self.product_repo), Arc::new(self.user_repo)),
                Arc::new(ProviderFactory::new(
                    Arc::new(self.mercado_pago),
                    Arc::new(self.stripe),
                )),
            )
        }
    }

    fn customer_id() -> Uuid {
        Uuid::from_u128(7)
    }

    fn sample_metadata() -> PaymentMetadata {
        PaymentMetadata {
            products: vec![ProductSnapshotModel {
                product_id: "prod-1".to_string(),
                size: Some("M".to_string()),
                quantity: 3,
                unit_price: 10.0,
            }],
            customer_id: Some(customer_id()),
            ..Default::default()
        }
    }

    fn sample_entity(status: PaymentStatus) -> PaymentEntity {
        let now = Utc::now();
        PaymentEntity {
            id: Uuid::from_u128(1),
            order_id: "ORDER-1".to_string(),
            amount: 20.0,
            currency: "USD".to_string(),
            status: status.as_str().to_string(),
            provider: "MERCADO_PAGO".to_string(),
            provider_payment_id: Some("pref-1".to_string()),
            transaction_id: Some("txn-1".to_string()),
            metadata: serde_json::to_value(sample_metadata()).unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_product(stock: i32) -> ProductModel {
        ProductModel {
            id: "prod-1".to_string(),
            name: "Shirt".to_string(),
            description: None,
            price: 10.0,
            available: true,
            sizes: vec![SizeStockModel {
                size: "M".to_string(),
                stock,
            }],
        }
    }

    fn sample_create_dto() -> CreatePaymentModel {
        CreatePaymentModel {
            amount: None,
            currency: "USD".to_string(),
            description: Some("Two shirts".to_string()),
            callback_url: Some("https://shop.test/checkout".to_string()),
            customer_email: Some("buyer@example.com".to_string()),
            items: vec![PaymentItemModel {
                id: "prod-1".to_string(),
                title: "Shirt".to_string(),
                description: None,
                size: Some("M".to_string()),
                quantity: 2,
                unit_price: 10.0,
            }],
            metadata: CreatePaymentMetadata::default(),
            provider: PaymentProvider::MercadoPago,
        }
    }

    fn webhook_event(status: PaymentStatus) -> WebhookEventModel {
        WebhookEventModel {
            provider: PaymentProvider::MercadoPago,
            provider_payment_id: None,
            external_reference: Some("ORDER-1".to_string()),
            transaction_id: Some("txn-1".to_string()),
            status,
            raw: json!({ "status": status.as_str() }),
        }
    }

    #[tokio::test]
    async fn create_payment_uses_the_computed_total_over_the_client_amount() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .withf(|order_id| order_id.starts_with("ORDER-"))
            .returning(|_| Box::pin(async { Ok(None) }));
        mocks
            .payment_repo
            .expect_create()
            .withf(|insert| {
                insert.amount == 20.0
                    && insert.currency == "USD"
                    && insert.status == "PENDING"
                    && insert.provider == "MERCADO_PAGO"
                    && insert.provider_payment_id.as_deref() == Some("pref-1")
            })
            .times(1)
            .returning(|insert| {
                let now = Utc::now();
                let entity = PaymentEntity {
                    id: Uuid::from_u128(1),
                    order_id: insert.order_id,
                    amount: insert.amount,
                    currency: insert.currency,
                    status: insert.status,
                    provider: insert.provider,
                    provider_payment_id: insert.provider_payment_id,
                    transaction_id: insert.transaction_id,
                    metadata: insert.metadata,
                    created_at: now,
                    updated_at: now,
                };
                Box::pin(async move { Ok(entity) })
            });

        mocks
            .mercado_pago
            .expect_create_payment()
            .withf(|request| request.amount == 20.0 && request.currency == "USD")
            .times(1)
            .returning(|request| {
                let outcome = ProviderPaymentOutcome {
                    status: PaymentStatus::Pending,
                    provider_payment_id: "pref-1".to_string(),
                    redirect_url: "https://mp.test/init".to_string(),
                    external_reference: request.external_reference,
                    amount: request.amount,
                    processor_response: json!({ "id": "pref-1" }),
                };
                Box::pin(async move { Ok(outcome) })
            });

        let mut dto = sample_create_dto();
        dto.amount = Some(99.0);

        let response = mocks.build().create_payment(dto).await.unwrap();

        assert_eq!(response.status, PaymentStatus::Pending);
        assert_eq!(response.payment_id.as_deref(), Some("pref-1"));
        assert_eq!(response.redirect_url, "https://mp.test/init");
    }

    #[tokio::test]
    async fn create_payment_rejects_a_duplicate_order_id() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .withf(|order_id| order_id == "ORDER-9")
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Pending))) }));
        mocks.mercado_pago.expect_create_payment().times(0);
        mocks.payment_repo.expect_create().times(0);

        let mut dto = sample_create_dto();
        dto.metadata.order_id = Some("ORDER-9".to_string());

        let err = mocks.build().create_payment(dto).await.unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateOrder(order_id) if order_id == "ORDER-9"));
    }

    #[tokio::test]
    async fn approval_webhook_decrements_stock_and_records_the_purchase() {
        let mut mocks = Mocks::new();

        mocks
            .mercado_pago
            .expect_process_webhook()
            .returning(|_| Box::pin(async { Ok(vec![webhook_event(PaymentStatus::Approved)]) }));
        mocks
            .payment_repo
            .expect_find_by_order_id()
            .withf(|order_id| order_id == "ORDER-1")
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Pending))) }));
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("APPROVED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Approved)) }));

        mocks
            .product_repo
            .expect_find_by_id()
            .withf(|id| id == "prod-1")
            .returning(|_| Box::pin(async { Ok(Some(sample_product(5))) }));
        mocks
            .product_repo
            .expect_update_size_stock()
            .withf(|id, size, stock| id == "prod-1" && size == "M" && *stock == 2)
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        mocks
            .user_repo
            .expect_append_purchase()
            .withf(|id, purchase| *id == customer_id() && purchase.total == 20.0)
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        mocks
            .user_repo
            .expect_clear_cart()
            .withf(|id| *id == customer_id())
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        mocks
            .build()
            .process_webhook(
                PaymentProvider::MercadoPago,
                WebhookRequest {
                    raw_body: b"{}".to_vec(),
                    signature: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_approval_webhook_is_a_no_op() {
        let mut mocks = Mocks::new();

        mocks
            .mercado_pago
            .expect_process_webhook()
            .returning(|_| Box::pin(async { Ok(vec![webhook_event(PaymentStatus::Approved)]) }));
        mocks
            .payment_repo
            .expect_find_by_order_id()
            .withf(|order_id| order_id == "ORDER-1")
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Approved))) }));

        mocks.payment_repo.expect_update().times(0);
        mocks.product_repo.expect_update_size_stock().times(0);
        mocks.user_repo.expect_append_purchase().times(0);

        mocks
            .build()
            .process_webhook(
                PaymentProvider::MercadoPago,
                WebhookRequest {
                    raw_body: b"{}".to_vec(),
                    signature: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_lookup_prefers_the_provider_payment_id() {
        let mut mocks = Mocks::new();

        let event = WebhookEventModel {
            provider: PaymentProvider::MercadoPago,
            provider_payment_id: Some("pref-1".to_string()),
            external_reference: Some("ORDER-1".to_string()),
            transaction_id: Some("txn-9".to_string()),
            status: PaymentStatus::Rejected,
            raw: json!({ "status": "rejected" }),
        };
        mocks
            .mercado_pago
            .expect_process_webhook()
            .returning(move |_| {
                let event = event.clone();
                Box::pin(async move { Ok(vec![event]) })
            });

        mocks
            .payment_repo
            .expect_find_by_provider_payment_id()
            .withf(|provider_payment_id, provider| {
                provider_payment_id == "pref-1" && provider == "MERCADO_PAGO"
            })
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Pending))) }));
        mocks.payment_repo.expect_find_by_order_id().times(0);
        mocks.payment_repo.expect_find_by_transaction_id().times(0);
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("REJECTED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Rejected)) }));

        mocks
            .build()
            .process_webhook(
                PaymentProvider::MercadoPago,
                WebhookRequest {
                    raw_body: b"{}".to_vec(),
                    signature: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_for_an_unknown_payment_fails_with_not_found() {
        let mut mocks = Mocks::new();

        mocks
            .mercado_pago
            .expect_process_webhook()
            .returning(|_| Box::pin(async { Ok(vec![webhook_event(PaymentStatus::Approved)]) }));
        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        mocks
            .payment_repo
            .expect_find_by_transaction_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let err = mocks
            .build()
            .process_webhook(
                PaymentProvider::MercadoPago,
                WebhookRequest {
                    raw_body: b"{}".to_vec(),
                    signature: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound));
    }

    #[tokio::test]
    async fn out_of_order_refund_webhook_records_status_without_restoring_stock() {
        let mut mocks = Mocks::new();

        mocks
            .mercado_pago
            .expect_process_webhook()
            .returning(|_| Box::pin(async { Ok(vec![webhook_event(PaymentStatus::Refunded)]) }));
        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Pending))) }));
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("REFUNDED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Refunded)) }));

        mocks.product_repo.expect_find_by_id().times(0);
        mocks.product_repo.expect_update_size_stock().times(0);

        mocks
            .build()
            .process_webhook(
                PaymentProvider::MercadoPago,
                WebhookRequest {
                    raw_body: b"{}".to_vec(),
                    signature: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refund_defaults_to_the_full_amount_and_restores_stock() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .withf(|order_id| order_id == "ORDER-1")
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Approved))) }));
        mocks
            .mercado_pago
            .expect_refund_payment()
            .withf(|request| {
                request.amount.is_none()
                    && request.payment_ids.transaction_id.as_deref() == Some("txn-1")
            })
            .times(1)
            .returning(|_| {
                Box::pin(async {
                    Ok(RefundOutcome {
                        status: PaymentStatus::Approved,
                        refund_id: Some("ref-1".to_string()),
                        processor_response: json!({ "id": "ref-1" }),
                    })
                })
            });
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("REFUNDED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Refunded)) }));

        mocks
            .product_repo
            .expect_find_by_id()
            .withf(|id| id == "prod-1")
            .returning(|_| Box::pin(async { Ok(Some(sample_product(2))) }));
        mocks
            .product_repo
            .expect_update_size_stock()
            .withf(|id, size, stock| id == "prod-1" && size == "M" && *stock == 5)
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let response = mocks
            .build()
            .refund_payment("ORDER-1", None)
            .await
            .unwrap();

        assert_eq!(response.status, PaymentStatus::Refunded);
        assert_eq!(response.refund_id.as_deref(), Some("ref-1"));
        assert_eq!(response.refund_amount, 20.0);
        assert_eq!(response.refund_status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn refunding_a_refunded_payment_fails_with_invalid_status() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Refunded))) }));
        mocks.mercado_pago.expect_refund_payment().times(0);
        mocks.payment_repo.expect_update().times(0);

        let err = mocks
            .build()
            .refund_payment("ORDER-1", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidStatus {
                current: PaymentStatus::Refunded,
                required: PaymentStatus::Approved,
            }
        ));
    }

    #[tokio::test]
    async fn refund_exceeding_the_payment_total_is_rejected() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Approved))) }));
        mocks.mercado_pago.expect_refund_payment().times(0);

        let err = mocks
            .build()
            .refund_payment("ORDER-1", Some(25.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[tokio::test]
    async fn status_lookup_serves_the_ledger_when_a_refund_is_recorded() {
        let mut mocks = Mocks::new();

        let mut metadata = sample_metadata();
        metadata.refund_details = Some(RefundDetails {
            id: Some("ref-1".to_string()),
            amount: 20.0,
            date: Utc::now(),
            status: PaymentStatus::Refunded,
        });
        let mut entity = sample_entity(PaymentStatus::Refunded);
        entity.metadata = serde_json::to_value(metadata).unwrap();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(move |_| {
                let entity = entity.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });
        mocks.mercado_pago.expect_get_payment_details().times(0);
        mocks.payment_repo.expect_update().times(0);

        let response = mocks.build().get_payment_status("ORDER-1").await.unwrap();
        assert_eq!(response.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn status_lookup_persists_a_newer_provider_status() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Pending))) }));
        mocks
            .mercado_pago
            .expect_get_payment_details()
            .withf(|ids| ids.transaction_id.as_deref() == Some("txn-1"))
            .times(1)
            .returning(|_| Box::pin(async { Ok(PaymentStatus::Rejected) }));
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("REJECTED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Rejected)) }));

        let response = mocks.build().get_payment_status("ORDER-1").await.unwrap();
        assert_eq!(response.status, PaymentStatus::Rejected);
    }

    #[tokio::test]
    async fn status_poll_persists_an_approval_without_firing_stock_effects() {
        // Inventory and purchase history mutate only through webhook
        // reconciliation; a poll that observes APPROVED records the status
        // and nothing else.
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Pending))) }));
        mocks
            .mercado_pago
            .expect_get_payment_details()
            .times(1)
            .returning(|_| Box::pin(async { Ok(PaymentStatus::Approved) }));
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("APPROVED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Approved)) }));

        mocks.product_repo.expect_find_by_id().times(0);
        mocks.product_repo.expect_update_size_stock().times(0);
        mocks.user_repo.expect_append_purchase().times(0);
        mocks.user_repo.expect_clear_cart().times(0);

        let response = mocks.build().get_payment_status("ORDER-1").await.unwrap();
        assert_eq!(response.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn listing_refunds_backfills_a_refund_the_ledger_missed() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Approved))) }));
        mocks.mercado_pago.expect_get_refunds().returning(|_| {
            Box::pin(async {
                Ok(vec![RefundRecordModel {
                    id: "ref-7".to_string(),
                    amount: 20.0,
                    status: PaymentStatus::Approved,
                    date_created: Utc::now(),
                    metadata: json!({}),
                }])
            })
        });
        mocks
            .payment_repo
            .expect_update()
            .withf(|_, changes| changes.status.as_deref() == Some("REFUNDED"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(sample_entity(PaymentStatus::Refunded)) }));
        mocks
            .product_repo
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_product(2))) }));
        mocks
            .product_repo
            .expect_update_size_stock()
            .withf(|_, _, stock| *stock == 5)
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let refunds = mocks.build().get_refunds("ORDER-1").await.unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].id, "ref-7");
    }

    #[tokio::test]
    async fn fetching_a_refund_requires_one_recorded_locally() {
        let mut mocks = Mocks::new();

        mocks
            .payment_repo
            .expect_find_by_order_id()
            .returning(|_| Box::pin(async { Ok(Some(sample_entity(PaymentStatus::Approved))) }));
        mocks.mercado_pago.expect_get_refund().times(0);

        let err = mocks
            .build()
            .get_refund("ORDER-1", "ref-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound));
    }
}
