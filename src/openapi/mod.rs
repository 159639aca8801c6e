use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FarmDirect API",
        version = "0.3.0",
        description = r#"
# FarmDirect Order Fulfillment API

Order fulfillment backend for a multi-vendor farm marketplace: order
lifecycle management, atomic inventory reservation, payment orchestration,
refunds, and shipping rates and tracking.

## Error Handling

Errors use a consistent response format with appropriate HTTP status codes:

```json
{
  "error": "Conflict",
  "message": "Order was modified concurrently, please retry",
  "request_id": "…",
  "timestamp": "2025-08-25T00:00:00Z"
}
```

Validation failures additionally carry a `details` array of
`{ field, code, message }` issues.

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order lifecycle endpoints"),
        (name = "inventory", description = "Stock level and reservation endpoints"),
        (name = "payments", description = "Payment and refund endpoints"),
        (name = "shipping", description = "Rate quote and label endpoints"),
        (name = "tracking", description = "Shipment tracking endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,

        // Inventory
        crate::handlers::inventory::get_stock_level,
        crate::handlers::inventory::list_farm_stock,
        crate::handlers::inventory::reserve_stock,
        crate::handlers::inventory::release_stock,

        // Payments
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::confirm_payment,
        crate::handlers::payments::list_order_payments,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::refund_payment,
        crate::handlers::payments::list_refunds,

        // Shipping and tracking
        crate::handlers::shipping::calculate_rates,
        crate::handlers::shipping::create_zone,
        crate::handlers::shipping::list_zones,
        crate::handlers::shipping::create_label,
        crate::handlers::tracking::get_tracking_info,
        crate::handlers::tracking::classify_tracking_number,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,

            // Domain enums
            crate::models::OrderStatus,
            crate::models::PaymentStatus,
            crate::models::FulfillmentMethod,
            crate::models::PaymentMethod,
            crate::models::RefundStatus,
            crate::models::Carrier,

            // Order types
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::CreateOrderItem,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::StatusUpdateOutcome,
            crate::services::pricing::OrderTotals,
            crate::handlers::orders::CancelOrderRequest,

            // Inventory types
            crate::services::inventory::StockLevel,
            crate::handlers::inventory::StockAdjustmentRequest,

            // Payment types
            crate::services::payments::CreatePaymentIntentRequest,
            crate::services::payments::RefundPaymentRequest,
            crate::services::payments::PaymentResponse,
            crate::services::payments::RefundResponse,
            crate::services::payments::ConfirmPaymentOutcome,

            // Shipping and tracking types
            crate::services::shipping::RateQuoteRequest,
            crate::services::shipping::RateQuote,
            crate::services::shipping::CreateZoneRequest,
            crate::entities::delivery_zone::Model,
            crate::services::tracking::CreateLabelRequest,
            crate::services::tracking::ShippingLabel,
            crate::services::tracking::TrackingInfo,
            crate::services::tracking::TrackingEvent,
            crate::services::tracking::ParsedTrackingNumber,

            // Error types
            crate::errors::ErrorResponse,
            crate::errors::ValidationIssue
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
