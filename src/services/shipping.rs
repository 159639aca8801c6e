//! Delivery-zone rate quotes.
//!
//! Distance computation sits behind `DistanceProvider` so rate math stays
//! testable without a geocoding dependency; the default implementation is a
//! deterministic zip-code heuristic.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{delivery_zone, farm};
use crate::errors::ServiceError;
use crate::models::FulfillmentMethod;

use super::pricing::round2;

/// Surcharge ladder over package weight in pounds.
pub fn weight_surcharge(weight_lb: Decimal) -> Decimal {
    if weight_lb <= dec!(5) {
        Decimal::ZERO
    } else if weight_lb <= dec!(10) {
        dec!(2)
    } else if weight_lb <= dec!(20) {
        dec!(5)
    } else if weight_lb <= dec!(50) {
        dec!(10)
    } else {
        dec!(15)
    }
}

/// Farm-to-destination distance lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistanceProvider: Send + Sync {
    async fn distance_miles(
        &self,
        origin_zip: &str,
        destination_zip: &str,
    ) -> Result<Decimal, ServiceError>;
}

/// Deterministic stand-in for a geocoding service: distance grows with the
/// numeric gap between zip codes, capped so nonsense inputs stay finite.
#[derive(Debug, Default)]
pub struct ZipGapDistanceProvider;

#[async_trait]
impl DistanceProvider for ZipGapDistanceProvider {
    async fn distance_miles(
        &self,
        origin_zip: &str,
        destination_zip: &str,
    ) -> Result<Decimal, ServiceError> {
        let origin: i64 = origin_zip
            .parse()
            .map_err(|_| ServiceError::InvalidInput(format!("Invalid zip code {}", origin_zip)))?;
        let destination: i64 = destination_zip.parse().map_err(|_| {
            ServiceError::InvalidInput(format!("Invalid zip code {}", destination_zip))
        })?;

        let gap = (origin - destination).abs().min(2_000);
        Ok(Decimal::from(gap) * dec!(0.1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateQuoteRequest {
    pub farm_id: Uuid,
    pub destination_zip: String,
    pub weight_lb: Decimal,
    pub order_value: Decimal,
    pub method: FulfillmentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateQuote {
    pub zone_id: Option<Uuid>,
    pub zone_name: String,
    pub method: FulfillmentMethod,
    pub rate: Decimal,
    pub estimated_days: i32,
    pub free_shipping_applied: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateZoneRequest {
    pub name: String,
    /// Comma-separated zip codes this zone serves.
    pub zip_codes: String,
    pub radius_miles: Decimal,
    pub base_rate: Decimal,
    pub per_mile_rate: Decimal,
    pub free_shipping_threshold: Option<Decimal>,
    pub estimated_days: i32,
}

#[derive(Clone)]
pub struct ShippingService {
    db: Arc<DbPool>,
    distance: Arc<dyn DistanceProvider>,
}

impl ShippingService {
    pub fn new(db: Arc<DbPool>, distance: Arc<dyn DistanceProvider>) -> Self {
        Self { db, distance }
    }

    /// Quotes delivery rates for a shipment. Pickup always yields exactly one
    /// zero-cost quote; delivery yields one quote per matching zone, possibly
    /// none.
    #[instrument(skip(self, request), fields(farm_id = %request.farm_id, zip = %request.destination_zip))]
    pub async fn calculate_rates(
        &self,
        request: RateQuoteRequest,
    ) -> Result<Vec<RateQuote>, ServiceError> {
        if request.method == FulfillmentMethod::Pickup {
            return Ok(vec![RateQuote {
                zone_id: None,
                zone_name: "Farm pickup".to_string(),
                method: FulfillmentMethod::Pickup,
                rate: Decimal::ZERO,
                estimated_days: 0,
                free_shipping_applied: false,
                reason: None,
            }]);
        }

        let farm = farm::Entity::find_by_id(request.farm_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Farm {} not found", request.farm_id)))?;

        let distance = self
            .distance
            .distance_miles(&farm.zip_code, &request.destination_zip)
            .await?;

        let zones = delivery_zone::Entity::find().all(&*self.db).await?;
        let surcharge = weight_surcharge(request.weight_lb);

        let quotes = zones
            .into_iter()
            .filter(|zone| zone.serves_zip(&request.destination_zip))
            .filter(|zone| zone.radius_miles >= distance)
            .map(|zone| {
                let free = matches!(
                    zone.free_shipping_threshold,
                    Some(threshold) if request.order_value >= threshold
                );
                let rate = if free {
                    Decimal::ZERO
                } else {
                    round2(zone.base_rate + distance * zone.per_mile_rate + surcharge)
                };
                RateQuote {
                    zone_id: Some(zone.id),
                    zone_name: zone.name,
                    method: FulfillmentMethod::Delivery,
                    rate,
                    estimated_days: zone.estimated_days,
                    free_shipping_applied: free,
                    reason: free.then(|| "Order value qualifies for free delivery".to_string()),
                }
            })
            .collect();

        Ok(quotes)
    }

    #[instrument(skip(self, request))]
    pub async fn create_zone(
        &self,
        request: CreateZoneRequest,
    ) -> Result<delivery_zone::Model, ServiceError> {
        if request.radius_miles <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Zone radius must be positive".to_string(),
            ));
        }
        if request.estimated_days < 0 {
            return Err(ServiceError::InvalidInput(
                "Estimated days cannot be negative".to_string(),
            ));
        }

        let zone = delivery_zone::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            zip_codes: Set(request.zip_codes),
            radius_miles: Set(request.radius_miles),
            base_rate: Set(request.base_rate),
            per_mile_rate: Set(request.per_mile_rate),
            free_shipping_threshold: Set(request.free_shipping_threshold),
            estimated_days: Set(request.estimated_days),
            created_at: Set(Utc::now()),
        };
        let zone = zone.insert(&*self.db).await?;
        info!(zone_id = %zone.id, name = %zone.name, "Delivery zone created");
        Ok(zone)
    }

    #[instrument(skip(self))]
    pub async fn list_zones(&self) -> Result<Vec<delivery_zone::Model>, ServiceError> {
        Ok(delivery_zone::Entity::find()
            .order_by_asc(delivery_zone::Column::Name)
            .all(&*self.db)
            .await?)
    }
}
