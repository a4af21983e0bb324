pub mod payment_providers;
pub mod payments;
pub mod products;
pub mod users;
