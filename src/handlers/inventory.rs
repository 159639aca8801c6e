use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::inventory::StockLevel;
use crate::{ApiResponse, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustmentRequest {
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/products/{id}",
    summary = "Get stock level",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Stock level retrieved", body = ApiResponse<StockLevel>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn get_stock_level(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<StockLevel>>, ServiceError> {
    let level = state.services.inventory.get_stock_level(id).await?;
    Ok(Json(ApiResponse::success(level)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/farms/{farm_id}",
    summary = "List farm stock",
    description = "Stock levels for every active product of a farm",
    params(("farm_id" = Uuid, Path, description = "Farm ID")),
    responses(
        (status = 200, description = "Stock levels retrieved", body = ApiResponse<Vec<StockLevel>>),
    ),
    tag = "inventory"
)]
pub async fn list_farm_stock(
    State(state): State<AppState>,
    Path(farm_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StockLevel>>>, ServiceError> {
    let levels = state.services.inventory.list_farm_stock(farm_id).await?;
    Ok(Json(ApiResponse::success(levels)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/products/{id}/reserve",
    summary = "Reserve stock",
    description = "Atomically reserve units; rejected when fewer are available",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = StockAdjustmentRequest,
    responses(
        (status = 200, description = "Stock reserved", body = ApiResponse<StockLevel>),
        (status = 422, description = "Insufficient inventory", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn reserve_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StockAdjustmentRequest>,
) -> Result<Json<ApiResponse<StockLevel>>, ServiceError> {
    state
        .services
        .inventory
        .reserve_stock(id, request.quantity)
        .await?;
    let level = state.services.inventory.get_stock_level(id).await?;
    Ok(Json(ApiResponse::success(level)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/products/{id}/release",
    summary = "Release stock",
    description = "Return previously reserved units to available stock",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = StockAdjustmentRequest,
    responses(
        (status = 200, description = "Stock released", body = ApiResponse<StockLevel>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn release_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StockAdjustmentRequest>,
) -> Result<Json<ApiResponse<StockLevel>>, ServiceError> {
    state
        .services
        .inventory
        .release_stock(id, request.quantity)
        .await?;
    let level = state.services.inventory.get_stock_level(id).await?;
    Ok(Json(ApiResponse::success(level)))
}
