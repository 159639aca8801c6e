use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::payments::{
    ConfirmPaymentOutcome, CreatePaymentIntentRequest, PaymentResponse, RefundPaymentRequest,
    RefundResponse,
};
use crate::{ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payments/intent",
    summary = "Create payment intent",
    description = "Start payment for an unpaid order; the amount must match the order total",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 201, description = "Payment intent created", body = ApiResponse<PaymentResponse>),
        (status = 402, description = "Provider rejected the intent", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let payment = state
        .services
        .payments
        .create_payment_intent(id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payments/confirm",
    summary = "Confirm payment",
    description = "Capture the pending payment; confirming an already-paid order is a no-op",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment captured or already captured", body = ApiResponse<ConfirmPaymentOutcome>),
        (status = 402, description = "Provider declined the capture", body = crate::errors::ErrorResponse),
        (status = 404, description = "No pending payment", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ConfirmPaymentOutcome>>, ServiceError> {
    let outcome = state.services.payments.confirm_payment(id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payments",
    summary = "List order payments",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payments retrieved", body = ApiResponse<Vec<PaymentResponse>>),
    ),
    tag = "payments"
)]
pub async fn list_order_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, ServiceError> {
    let payments = state.services.payments.list_payments_for_order(id).await?;
    Ok(Json(ApiResponse::success(payments)))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    summary = "Get payment",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment retrieved", body = ApiResponse<PaymentResponse>),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state.services.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::success(payment)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refunds",
    summary = "Refund payment",
    description = "Refund a captured payment, fully or partially; cumulative refunds never exceed the captured amount",
    params(("id" = Uuid, Path, description = "Payment ID")),
    request_body = RefundPaymentRequest,
    responses(
        (status = 201, description = "Refund issued", body = ApiResponse<RefundResponse>),
        (status = 400, description = "Refund exceeds remaining amount", body = crate::errors::ErrorResponse),
        (status = 402, description = "Provider rejected the refund", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RefundResponse>>), ServiceError> {
    let refund = state.services.payments.refund_payment(id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(refund))))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/refunds",
    summary = "List refunds",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Refunds retrieved", body = ApiResponse<Vec<RefundResponse>>),
    ),
    tag = "payments"
)]
pub async fn list_refunds(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<RefundResponse>>>, ServiceError> {
    let refunds = state.services.payments.list_refunds(id).await?;
    Ok(Json(ApiResponse::success(refunds)))
}
