pub mod inventory;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod tracking;
