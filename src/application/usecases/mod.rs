pub mod inventory;
pub mod payments;
