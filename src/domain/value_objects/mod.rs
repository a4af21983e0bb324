pub mod enums;
pub mod money;
pub mod payment_errors;
pub mod payments;
pub mod products;
