pub mod inventory;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod shipping;
pub mod tracking;
pub mod validation;
