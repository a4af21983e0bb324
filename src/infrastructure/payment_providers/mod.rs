pub mod factory;
pub mod mercado_pago;
pub mod stripe;
