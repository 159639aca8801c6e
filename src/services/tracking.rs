//! Tracking numbers, labels, and shipment progress.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Carrier, OrderStatus};

/// Carrier classification of a tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParsedTrackingNumber {
    pub carrier: Option<Carrier>,
    pub valid: bool,
}

/// Classifies a tracking number by carrier format:
/// USPS `94` + 20 digits, UPS `1Z` + 16 alphanumerics, FedEx 12 to 14
/// digits, FARM (local farm delivery) `FARM` + digits.
pub fn parse_tracking_number(input: &str) -> ParsedTrackingNumber {
    let s = input.trim();

    let carrier = if let Some(rest) = s.strip_prefix("FARM") {
        (!rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())).then_some(Carrier::Farm)
    } else if let Some(rest) = s.strip_prefix("1Z") {
        (rest.len() == 16 && rest.bytes().all(|b| b.is_ascii_alphanumeric()))
            .then_some(Carrier::Ups)
    } else if s.len() == 22 && s.starts_with("94") && s.bytes().all(|b| b.is_ascii_digit()) {
        Some(Carrier::Usps)
    } else if (12..=14).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit()) {
        Some(Carrier::Fedex)
    } else {
        None
    };

    ParsedTrackingNumber {
        carrier,
        valid: carrier.is_some(),
    }
}

fn generate_tracking_number(carrier: Carrier, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    let prefix = carrier.label_prefix();
    match carrier {
        // Pad so generated numbers satisfy the format they are parsed by
        Carrier::Usps => format!("{prefix}{millis:020}"),
        Carrier::Ups => format!("{prefix}{millis:016}"),
        Carrier::Fedex => format!("{prefix}{millis:013}"),
        Carrier::Farm => format!("{prefix}{millis}"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateLabelRequest {
    pub carrier: Carrier,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingLabel {
    pub order_id: Uuid,
    pub tracking_number: String,
    pub carrier: Carrier,
    pub estimated_delivery: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingEvent {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingInfo {
    pub tracking_number: String,
    pub carrier: Option<Carrier>,
    pub status: String,
    pub current_location: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub events: Vec<TrackingEvent>,
}

#[derive(Clone)]
pub struct TrackingService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl TrackingService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a shipping label for an order being prepared. The write is
    /// conditional on the order still being in a preparable state, so a
    /// racing cancellation wins cleanly.
    #[instrument(skip(self), fields(order_id = %order_id, carrier = %carrier))]
    pub async fn create_label(
        &self,
        order_id: Uuid,
        carrier: Carrier,
    ) -> Result<ShippingLabel, ServiceError> {
        let existing = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !existing.status.is_preparable() {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot create a label for an order in status {}",
                existing.status
            )));
        }
        if existing.tracking_number.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Order {} already has a shipping label",
                order_id
            )));
        }

        let now = Utc::now();
        let tracking_number = generate_tracking_number(carrier, now);
        let estimated_delivery = now + Duration::days(carrier.transit_days());

        let change = order::ActiveModel {
            tracking_number: Set(Some(tracking_number.clone())),
            carrier: Set(Some(carrier.to_string())),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        let result = order::Entity::update_many()
            .set(change)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in([
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::Ready,
            ]))
            .filter(order::Column::TrackingNumber.is_null())
            .exec(&*self.db)
            .await
            .map_err(|e| {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    ServiceError::Conflict(
                        "Tracking number collision, please retry".to_string(),
                    )
                } else {
                    ServiceError::DatabaseError(e)
                }
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Order changed while creating the label".to_string(),
            ));
        }

        info!(order_id = %order_id, tracking_number = %tracking_number, "Shipping label created");
        self.event_sender
            .send_or_log(Event::LabelCreated {
                order_id,
                tracking_number: tracking_number.clone(),
                carrier: carrier.to_string(),
            })
            .await;

        Ok(ShippingLabel {
            order_id,
            tracking_number,
            carrier,
            estimated_delivery,
        })
    }

    /// Resolves a tracking number to its order and synthesizes shipment
    /// progress from the order's fulfillment timestamps.
    #[instrument(skip(self))]
    pub async fn get_tracking_info(
        &self,
        tracking_number: &str,
    ) -> Result<TrackingInfo, ServiceError> {
        let order = order::Entity::find()
            .filter(order::Column::TrackingNumber.eq(tracking_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No shipment found for tracking number {}",
                    tracking_number
                ))
            })?;

        let parsed = parse_tracking_number(tracking_number);
        let carrier = order
            .carrier
            .as_deref()
            .and_then(|c| c.parse::<Carrier>().ok())
            .or(parsed.carrier);

        let mut events = vec![TrackingEvent {
            timestamp: order.created_at,
            status: "ORDER_PLACED".to_string(),
            location: "Farm".to_string(),
            description: "Order placed".to_string(),
        }];
        if let Some(at) = order.confirmed_at {
            events.push(TrackingEvent {
                timestamp: at,
                status: "CONFIRMED".to_string(),
                location: "Farm".to_string(),
                description: "Order confirmed by the farm".to_string(),
            });
        }
        if let Some(at) = order.fulfilled_at {
            events.push(TrackingEvent {
                timestamp: at,
                status: "IN_TRANSIT".to_string(),
                location: "In transit".to_string(),
                description: "Shipment handed to the carrier".to_string(),
            });
        }
        if let Some(at) = order.completed_at {
            events.push(TrackingEvent {
                timestamp: at,
                status: "DELIVERED".to_string(),
                location: "Destination".to_string(),
                description: "Shipment delivered".to_string(),
            });
        }
        if let Some(at) = order.cancelled_at {
            events.push(TrackingEvent {
                timestamp: at,
                status: "CANCELLED".to_string(),
                location: "Farm".to_string(),
                description: "Order cancelled".to_string(),
            });
        }
        events.sort_by_key(|e| e.timestamp);

        let (status, current_location) = match order.status {
            OrderStatus::Completed => ("DELIVERED", "Destination"),
            OrderStatus::Cancelled => ("CANCELLED", "Farm"),
            OrderStatus::Fulfilled => ("IN_TRANSIT", "In transit"),
            _ => ("PRE_TRANSIT", "Farm"),
        };

        let estimated_delivery = carrier.and_then(|c| {
            order
                .fulfilled_at
                .map(|at| at + Duration::days(c.transit_days()))
        });

        Ok(TrackingInfo {
            tracking_number: tracking_number.to_string(),
            carrier,
            status: status.to_string(),
            current_location: current_location.to_string(),
            estimated_delivery,
            events,
        })
    }
}
