use std::sync::Arc;

use crate::{
    config::config_model::DotEnvyConfig,
    domain::{
        repositories::payment_providers::PaymentProviderAdapter,
        value_objects::enums::payment_providers::PaymentProvider,
    },
};

use super::{mercado_pago::MercadoPagoAdapter, stripe::StripeAdapter};

/// Resolves a provider id to its adapter. Both adapters are constructed once
/// at startup with their own configured clients; nothing is looked up from
/// ambient state at call time.
pub struct ProviderFactory {
    mercado_pago: Arc<dyn PaymentProviderAdapter>,
    stripe: Arc<dyn PaymentProviderAdapter>,
}

impl ProviderFactory {
    pub fn new(
        mercado_pago: Arc<dyn PaymentProviderAdapter>,
        stripe: Arc<dyn PaymentProviderAdapter>,
    ) -> Self {
        Self {
            mercado_pago,
            stripe,
        }
    }

    pub fn from_config(config: &DotEnvyConfig) -> Self {
        Self::new(
            Arc::new(MercadoPagoAdapter::new(
                &config.mercado_pago,
                &config.payment,
            )),
            Arc::new(StripeAdapter::new(&config.stripe)),
        )
    }

    pub fn resolve(&self, provider: PaymentProvider) -> Arc<dyn PaymentProviderAdapter> {
        match provider {
            PaymentProvider::MercadoPago => Arc::clone(&self.mercado_pago),
            PaymentProvider::Stripe => Arc::clone(&self.stripe),
        }
    }
}
