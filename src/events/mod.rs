use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::OrderStatus;

/// Domain events emitted by the services. Event emission is best-effort and
/// never fails the underlying operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        /// True when the payment was already captured and a refund is owed.
        refund_due: bool,
    },

    // Payment events
    PaymentIntentCreated {
        order_id: Uuid,
        payment_id: Uuid,
    },
    PaymentCaptured {
        order_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    PaymentFailed {
        order_id: Uuid,
        payment_id: Uuid,
        reason: String,
    },
    PaymentRefunded {
        payment_id: Uuid,
        refund_id: Uuid,
        amount: Decimal,
        partial: bool,
    },

    // Fulfillment events
    LabelCreated {
        order_id: Uuid,
        tracking_number: String,
        carrier: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging on failure instead of propagating it.
    /// Dropped events are an observability gap, not an operation failure.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }
}

/// Event processing loop: drains the channel and logs each event with
/// structured fields. Runs until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                total,
            } => {
                info!(order_id = %order_id, order_number = %order_number, total = %total, "Order created");
            }
            Event::OrderStatusChanged { order_id, from, to } => {
                info!(order_id = %order_id, from = %from, to = %to, "Order status changed");
            }
            Event::OrderCancelled {
                order_id,
                refund_due,
            } => {
                info!(order_id = %order_id, refund_due = refund_due, "Order cancelled");
            }
            Event::PaymentIntentCreated {
                order_id,
                payment_id,
            } => {
                info!(order_id = %order_id, payment_id = %payment_id, "Payment intent created");
            }
            Event::PaymentCaptured {
                order_id,
                payment_id,
                amount,
            } => {
                info!(order_id = %order_id, payment_id = %payment_id, amount = %amount, "Payment captured");
            }
            Event::PaymentFailed {
                order_id,
                payment_id,
                reason,
            } => {
                warn!(order_id = %order_id, payment_id = %payment_id, reason = %reason, "Payment failed");
            }
            Event::PaymentRefunded {
                payment_id,
                refund_id,
                amount,
                partial,
            } => {
                info!(payment_id = %payment_id, refund_id = %refund_id, amount = %amount, partial = partial, "Payment refunded");
            }
            Event::LabelCreated {
                order_id,
                tracking_number,
                carrier,
            } => {
                info!(order_id = %order_id, tracking_number = %tracking_number, carrier = %carrier, "Shipping label created");
            }
        }
    }

    info!("Event processing loop stopped");
}
