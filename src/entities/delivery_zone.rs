use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Geographic rate rule: a zone matches a quote request when its zip set
/// contains the destination and its radius covers the farm distance.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "delivery_zones")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Comma-separated zip codes served by this zone.
    pub zip_codes: String,
    pub radius_miles: Decimal,
    pub base_rate: Decimal,
    pub per_mile_rate: Decimal,
    pub free_shipping_threshold: Option<Decimal>,
    pub estimated_days: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Zip membership test over the stored comma-separated set.
    pub fn serves_zip(&self, zip: &str) -> bool {
        self.zip_codes
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == zip)
    }
}
