use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::entities::delivery_zone;
use crate::errors::ServiceError;
use crate::services::shipping::{CreateZoneRequest, RateQuote, RateQuoteRequest};
use crate::services::tracking::{CreateLabelRequest, ShippingLabel};
use crate::{ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/shipping/rates",
    summary = "Quote shipping rates",
    description = "One zero-cost quote for pickup; one quote per matching delivery zone otherwise",
    request_body = RateQuoteRequest,
    responses(
        (status = 200, description = "Rates quoted (possibly empty)", body = ApiResponse<Vec<RateQuote>>),
        (status = 404, description = "Farm not found", body = crate::errors::ErrorResponse),
    ),
    tag = "shipping"
)]
pub async fn calculate_rates(
    State(state): State<AppState>,
    Json(request): Json<RateQuoteRequest>,
) -> Result<Json<ApiResponse<Vec<RateQuote>>>, ServiceError> {
    let quotes = state.services.shipping.calculate_rates(request).await?;
    Ok(Json(ApiResponse::success(quotes)))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipping/zones",
    summary = "Create delivery zone",
    request_body = CreateZoneRequest,
    responses(
        (status = 201, description = "Zone created", body = ApiResponse<delivery_zone::Model>),
        (status = 400, description = "Invalid zone definition", body = crate::errors::ErrorResponse),
    ),
    tag = "shipping"
)]
pub async fn create_zone(
    State(state): State<AppState>,
    Json(request): Json<CreateZoneRequest>,
) -> Result<(StatusCode, Json<ApiResponse<delivery_zone::Model>>), ServiceError> {
    let zone = state.services.shipping.create_zone(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(zone))))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipping/zones",
    summary = "List delivery zones",
    responses(
        (status = 200, description = "Zones retrieved", body = ApiResponse<Vec<delivery_zone::Model>>),
    ),
    tag = "shipping"
)]
pub async fn list_zones(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<delivery_zone::Model>>>, ServiceError> {
    let zones = state.services.shipping.list_zones().await?;
    Ok(Json(ApiResponse::success(zones)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/label",
    summary = "Create shipping label",
    description = "Generate and attach a tracking number for an order being prepared",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CreateLabelRequest,
    responses(
        (status = 201, description = "Label created", body = ApiResponse<ShippingLabel>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order not preparable or already labelled", body = crate::errors::ErrorResponse),
    ),
    tag = "shipping"
)]
pub async fn create_label(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ShippingLabel>>), ServiceError> {
    let label = state
        .services
        .tracking
        .create_label(id, request.carrier)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(label))))
}
