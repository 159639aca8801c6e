pub mod customer;
pub mod customer_address;
pub mod delivery_zone;
pub mod farm;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod refund;
