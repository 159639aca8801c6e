//! Inventory reservation and release.
//!
//! Stock is only ever mutated through conditional single-statement updates so
//! concurrent checkouts can never oversell: the availability check and the
//! decrement happen in the same `UPDATE`, and a zero row count means another
//! writer got there first.

use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::metrics::RESERVATION_CONFLICTS;

/// Quantity at or below which a product is flagged as low stock.
const LOW_STOCK_THRESHOLD: i32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_available: i32,
    pub low_stock: bool,
}

#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Atomically reserves `quantity` units of a product.
    ///
    /// Runs on any connection so order creation can compose it into a
    /// transaction; a failed reservation there rolls back earlier ones.
    pub async fn reserve<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "Reservation quantity must be positive".to_string(),
            ));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::QuantityAvailable,
                Expr::col(product::Column::QuantityAvailable).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::QuantityAvailable.gte(quantity))
            .exec(conn)
            .await
            .map_err(|e| {
                error!(product_id = %product_id, error = %e, "Failed to reserve inventory");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected == 0 {
            RESERVATION_CONFLICTS.inc();
            let available = product::Entity::find_by_id(product_id)
                .one(conn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .map(|p| p.quantity_available)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;

            warn!(
                product_id = %product_id,
                available = available,
                requested = quantity,
                "Inventory reservation rejected"
            );
            return Err(ServiceError::InsufficientInventory {
                product_id,
                available,
                requested: quantity,
            });
        }

        info!(product_id = %product_id, quantity = quantity, "Reserved inventory");
        Ok(())
    }

    /// Returns `quantity` units to a product's available stock.
    pub async fn release<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "Release quantity must be positive".to_string(),
            ));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::QuantityAvailable,
                Expr::col(product::Column::QuantityAvailable).add(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await
            .map_err(|e| {
                error!(product_id = %product_id, error = %e, "Failed to release inventory");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        info!(product_id = %product_id, quantity = quantity, "Released inventory");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        Self::reserve(&*self.db, product_id, quantity).await
    }

    #[instrument(skip(self))]
    pub async fn release_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        Self::release(&*self.db, product_id, quantity).await
    }

    #[instrument(skip(self))]
    pub async fn get_stock_level(&self, product_id: Uuid) -> Result<StockLevel, ServiceError> {
        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(StockLevel {
            product_id: product.id,
            product_name: product.name,
            quantity_available: product.quantity_available,
            low_stock: product.quantity_available <= LOW_STOCK_THRESHOLD,
        })
    }

    /// Stock levels for every active product of a farm.
    #[instrument(skip(self))]
    pub async fn list_farm_stock(&self, farm_id: Uuid) -> Result<Vec<StockLevel>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::FarmId.eq(farm_id))
            .filter(product::Column::IsActive.eq(true))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(products
            .into_iter()
            .map(|p| StockLevel {
                product_id: p.id,
                product_name: p.name,
                low_stock: p.quantity_available <= LOW_STOCK_THRESHOLD,
                quantity_available: p.quantity_available,
            })
            .collect())
    }
}
