//! FarmDirect API Library
//!
//! Order fulfillment backend for a multi-vendor farm marketplace.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{response::Json, routing::get, routing::post, routing::put, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::services::inventory::InventoryService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;
use crate::services::shipping::ShippingService;
use crate::services::tracking::TrackingService;

/// Services wired once at startup and shared by the handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub inventory: Arc<InventoryService>,
    pub payments: Arc<PaymentService>,
    pub shipping: Arc<ShippingService>,
    pub tracking: Arc<TrackingService>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Orders
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/by-number/:order_number",
            get(handlers::orders::get_order_by_number),
        )
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        // Payments scoped to an order
        .route(
            "/orders/:id/payments",
            get(handlers::payments::list_order_payments),
        )
        .route(
            "/orders/:id/payments/intent",
            post(handlers::payments::create_payment_intent),
        )
        .route(
            "/orders/:id/payments/confirm",
            post(handlers::payments::confirm_payment),
        )
        // Payments and refunds
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/payments/:id/refunds",
            post(handlers::payments::refund_payment).get(handlers::payments::list_refunds),
        )
        // Inventory
        .route(
            "/inventory/products/:id",
            get(handlers::inventory::get_stock_level),
        )
        .route(
            "/inventory/farms/:farm_id",
            get(handlers::inventory::list_farm_stock),
        )
        .route(
            "/inventory/products/:id/reserve",
            post(handlers::inventory::reserve_stock),
        )
        .route(
            "/inventory/products/:id/release",
            post(handlers::inventory::release_stock),
        )
        // Shipping
        .route("/shipping/rates", post(handlers::shipping::calculate_rates))
        .route(
            "/shipping/zones",
            post(handlers::shipping::create_zone).get(handlers::shipping::list_zones),
        )
        .route("/orders/:id/label", post(handlers::shipping::create_label))
        // Tracking
        .route(
            "/tracking/:tracking_number",
            get(handlers::tracking::get_tracking_info),
        )
        .route(
            "/tracking/:tracking_number/carrier",
            get(handlers::tracking::classify_tracking_number),
        )
}

/// API root: service name, version, and top-level endpoints.
pub async fn api_status() -> Json<Value> {
    Json(json!({
        "service": "farmdirect-api",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "timestamp": Utc::now().to_rfc3339(),
        "endpoints": {
            "api": "/api/v1",
            "health": "/health",
            "metrics": "/metrics",
            "docs": "/swagger-ui"
        }
    }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        assert!(response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }
}
