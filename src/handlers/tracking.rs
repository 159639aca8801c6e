use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::errors::ServiceError;
use crate::services::tracking::{parse_tracking_number, ParsedTrackingNumber, TrackingInfo};
use crate::{ApiResponse, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/tracking/{tracking_number}",
    summary = "Get tracking info",
    description = "Shipment status and event history for a tracking number",
    params(("tracking_number" = String, Path, description = "Tracking number")),
    responses(
        (status = 200, description = "Tracking info retrieved", body = ApiResponse<TrackingInfo>),
        (status = 404, description = "No shipment for this number", body = crate::errors::ErrorResponse),
    ),
    tag = "tracking"
)]
pub async fn get_tracking_info(
    State(state): State<AppState>,
    Path(tracking_number): Path<String>,
) -> Result<Json<ApiResponse<TrackingInfo>>, ServiceError> {
    let info = state
        .services
        .tracking
        .get_tracking_info(&tracking_number)
        .await?;
    Ok(Json(ApiResponse::success(info)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tracking/{tracking_number}/carrier",
    summary = "Classify tracking number",
    description = "Identify the carrier from a tracking number's format",
    params(("tracking_number" = String, Path, description = "Tracking number")),
    responses(
        (status = 200, description = "Classification result", body = ApiResponse<ParsedTrackingNumber>),
    ),
    tag = "tracking"
)]
pub async fn classify_tracking_number(
    Path(tracking_number): Path<String>,
) -> Result<Json<ApiResponse<ParsedTrackingNumber>>, ServiceError> {
    Ok(Json(ApiResponse::success(parse_tracking_number(
        &tracking_number,
    ))))
}
