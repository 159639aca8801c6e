//! Business metrics exposed at `/metrics` in Prometheus text format.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref ORDERS_CREATED: IntCounter = register_int_counter!(
        "farmdirect_orders_created_total",
        "Orders successfully created"
    )
    .expect("metric registration");
    pub static ref ORDERS_FAILED: IntCounter = register_int_counter!(
        "farmdirect_orders_failed_total",
        "Order creation attempts that failed"
    )
    .expect("metric registration");
    pub static ref ORDERS_CANCELLED: IntCounter = register_int_counter!(
        "farmdirect_orders_cancelled_total",
        "Orders transitioned to CANCELLED"
    )
    .expect("metric registration");
    pub static ref RESERVATION_CONFLICTS: IntCounter = register_int_counter!(
        "farmdirect_inventory_reservation_conflicts_total",
        "Inventory reservations rejected for insufficient stock"
    )
    .expect("metric registration");
    pub static ref PAYMENTS_CAPTURED: IntCounter = register_int_counter!(
        "farmdirect_payments_captured_total",
        "Payments confirmed and captured"
    )
    .expect("metric registration");
    pub static ref PAYMENTS_FAILED: IntCounter = register_int_counter!(
        "farmdirect_payments_failed_total",
        "Payment attempts that failed at the provider"
    )
    .expect("metric registration");
    pub static ref REFUNDS_ISSUED: IntCounter = register_int_counter!(
        "farmdirect_refunds_issued_total",
        "Refunds recorded against captured payments"
    )
    .expect("metric registration");
}

/// Renders the default registry in Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("metrics encoding produced invalid utf8: {e}")))
}
