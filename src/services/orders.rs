//! Order creation, lifecycle, and queries.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::errors::{ServiceError, ValidationIssue};
use crate::events::{Event, EventSender};
use crate::metrics::{ORDERS_CANCELLED, ORDERS_CREATED, ORDERS_FAILED};
use crate::models::{FulfillmentMethod, OrderStatus, PaymentStatus};

use super::inventory::InventoryService;
use super::pricing::{OrderTotals, PricedLine, PricingRates};
use super::validation::OrderValidationService;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub farm_id: Uuid,
    pub fulfillment_method: FulfillmentMethod,
    pub items: Vec<CreateOrderItem>,
    pub delivery_address_id: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub discount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub subtotal: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            price_at_purchase: item.price_at_purchase,
            subtotal: item.subtotal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub farm_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_method: FulfillmentMethod,
    pub totals: OrderTotals,
    pub currency: String,
    pub delivery_address_id: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    pub fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            customer_id: order.customer_id,
            farm_id: order.farm_id,
            status: order.status,
            payment_status: order.payment_status,
            fulfillment_method: order.fulfillment_method,
            totals: OrderTotals {
                subtotal: order.subtotal,
                delivery_fee: order.delivery_fee,
                platform_fee: order.platform_fee,
                tax: order.tax,
                discount: order.discount,
                total: order.total,
                farmer_amount: order.farmer_amount,
            },
            currency: order.currency,
            delivery_address_id: order.delivery_address_id,
            scheduled_date: order.scheduled_date,
            time_slot: order.time_slot,
            tracking_number: order.tracking_number,
            carrier: order.carrier,
            notes: order.notes,
            cancel_reason: order.cancel_reason,
            cancelled_by: order.cancelled_by,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

/// Status change result; `refund_due` is raised on cancellation of a paid
/// order so callers know to follow up with the refund operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusUpdateOutcome {
    pub order: OrderResponse,
    pub refund_due: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    pub customer_id: Option<Uuid>,
    pub farm_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    validation: OrderValidationService,
    rates: PricingRates,
    order_number_prefix: String,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        rates: PricingRates,
        order_number_prefix: String,
        currency: String,
    ) -> Self {
        let validation = OrderValidationService::new(db.clone());
        Self {
            db,
            event_sender,
            validation,
            rates,
            order_number_prefix,
            currency,
        }
    }

    /// Validates the request, reserves inventory, and persists the order and
    /// its items in a single transaction.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, farm_id = %request.farm_id)
    )]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let result = self.create_order_inner(request).await;
        match &result {
            Ok(response) => {
                ORDERS_CREATED.inc();
                self.event_sender
                    .send_or_log(Event::OrderCreated {
                        order_id: response.id,
                        order_number: response.order_number.clone(),
                        total: response.totals.total,
                    })
                    .await;
            }
            Err(_) => ORDERS_FAILED.inc(),
        }
        result
    }

    async fn create_order_inner(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let context = self.validation.validate(&request).await?;

        // Validation guarantees every referenced product is in the context
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = context.products.get(&item.product_id).ok_or_else(|| {
                ServiceError::InternalError("Validated product missing from context".to_string())
            })?;
            lines.push((product.clone(), item.quantity));
        }

        let priced: Vec<PricedLine> = lines
            .iter()
            .map(|(product, quantity)| PricedLine {
                price_at_purchase: product.price,
                quantity: *quantity,
            })
            .collect();
        let discount = request.discount.unwrap_or(Decimal::ZERO);
        let totals = OrderTotals::compute(&priced, request.fulfillment_method, discount, &self.rates);

        // The rule pass rejects negative discounts; the cap needs the
        // computed charges, so it is enforced here
        let gross = totals.subtotal + totals.delivery_fee + totals.tax;
        if discount > gross {
            return Err(ServiceError::ValidationFailed(vec![ValidationIssue::new(
                "discount",
                "DISCOUNT_EXCEEDS_TOTAL",
                format!("Discount {} exceeds the order charges of {}", discount, gross),
            )]));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        // Any reservation failure drops the transaction and rolls back the
        // reservations made before it
        for (product, quantity) in &lines {
            InventoryService::reserve(&txn, product.id, *quantity).await?;
        }

        let now = Utc::now();
        let order_number = self.allocate_order_number(&txn, now).await?;
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(request.customer_id),
            farm_id: Set(request.farm_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            fulfillment_method: Set(request.fulfillment_method),
            subtotal: Set(totals.subtotal),
            delivery_fee: Set(totals.delivery_fee),
            platform_fee: Set(totals.platform_fee),
            tax: Set(totals.tax),
            discount: Set(totals.discount),
            total: Set(totals.total),
            farmer_amount: Set(totals.farmer_amount),
            currency: Set(self.currency.clone()),
            delivery_address_id: Set(request.delivery_address_id),
            scheduled_date: Set(request.scheduled_date),
            time_slot: Set(request.time_slot.clone()),
            tracking_number: Set(None),
            carrier: Set(None),
            notes: Set(request.notes.clone()),
            cancel_reason: Set(None),
            cancelled_by: Set(None),
            created_at: Set(now),
            confirmed_at: Set(None),
            fulfilled_at: Set(None),
            completed_at: Set(None),
            cancelled_at: Set(None),
            paid_at: Set(None),
            updated_at: Set(None),
            version: Set(1),
        };

        let order = order.insert(&txn).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                ServiceError::Conflict(
                    "Order number already allocated, please retry".to_string(),
                )
            } else {
                error!(error = %e, "Failed to insert order");
                ServiceError::DatabaseError(e)
            }
        })?;

        let item_models: Vec<order_item::ActiveModel> = lines
            .iter()
            .zip(&request.items)
            .map(|((product, quantity), item)| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                product_name: Set(product.name.clone()),
                quantity: Set(*quantity),
                price_at_purchase: Set(product.price),
                subtotal: Set(
                    PricedLine {
                        price_at_purchase: product.price,
                        quantity: *quantity,
                    }
                    .subtotal(),
                ),
                created_at: Set(now),
            })
            .collect();

        order_item::Entity::insert_many(item_models)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to insert order items");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, order_number = %order_number, "Order created");

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(OrderResponse::from_parts(order, items))
    }

    /// Allocates the next date-scoped order number inside the caller's
    /// transaction. The unique index on `order_number` backstops two
    /// allocations landing on the same sequence.
    async fn allocate_order_number<C: ConnectionTrait>(
        &self,
        conn: &C,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let created_today = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(day_start))
            .count(conn)
            .await?;

        Ok(format!(
            "{}-{}-{:04}",
            self.order_number_prefix,
            now.format("%Y%m%d"),
            created_today + 1
        ))
    }

    /// Applies a status transition. Every `(from, to)` pair absent from the
    /// transition table is rejected, and the write itself is conditional on
    /// the observed status so racing transitions lose explicitly instead of
    /// last-write-wins.
    #[instrument(skip(self), fields(order_id = %order_id, to = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<StatusUpdateOutcome, ServiceError> {
        let new_status = request.status;
        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let from = order.status;
        if !from.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatusTransition {
                from,
                to: new_status,
            });
        }

        let now = Utc::now();
        let mut change = order::ActiveModel {
            status: Set(new_status),
            version: Set(order.version + 1),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        match new_status {
            OrderStatus::Confirmed => change.confirmed_at = Set(Some(now)),
            OrderStatus::Fulfilled => change.fulfilled_at = Set(Some(now)),
            OrderStatus::Completed => change.completed_at = Set(Some(now)),
            OrderStatus::Cancelled => {
                change.cancelled_at = Set(Some(now));
                change.cancel_reason = Set(request.reason.clone());
                change.cancelled_by = Set(request.cancelled_by.clone());
            }
            _ => {}
        }

        let result = order::Entity::update_many()
            .set(change)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(from))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            // A concurrent transition won; report against the fresh status
            let current = order::Entity::find_by_id(order_id)
                .one(&txn)
                .await?
                .map(|o| o.status)
                .unwrap_or(from);
            return Err(ServiceError::InvalidStatusTransition {
                from: current,
                to: new_status,
            });
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        let mut refund_due = false;
        if new_status == OrderStatus::Cancelled {
            for item in &items {
                InventoryService::release(&txn, item.product_id, item.quantity).await?;
            }
            refund_due = order.payment_status == PaymentStatus::Completed;
        }

        txn.commit().await?;

        info!(order_id = %order_id, from = %from, to = %new_status, "Order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                from,
                to: new_status,
            })
            .await;
        if new_status == OrderStatus::Cancelled {
            ORDERS_CANCELLED.inc();
            self.event_sender
                .send_or_log(Event::OrderCancelled {
                    order_id,
                    refund_due,
                })
                .await;
        }

        let updated = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        Ok(StatusUpdateOutcome {
            order: OrderResponse::from_parts(updated, items),
            refund_due,
        })
    }

    /// Cancels an order with an optional reason; sugar over `update_status`.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
        cancelled_by: Option<String>,
    ) -> Result<StatusUpdateOutcome, ServiceError> {
        self.update_status(
            order_id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Cancelled,
                reason,
                cancelled_by,
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.with_items(order).await
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let order = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;
        self.with_items(order).await
    }

    /// Paginated listing, newest first, with optional filters.
    #[instrument(skip(self, filter))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(farm_id) = filter.farm_id {
            query = query.filter(order::Column::FarmId.eq(farm_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            responses.push(self.with_items(order).await?);
        }
        Ok((responses, total))
    }

    async fn with_items(&self, order: order::Model) -> Result<OrderResponse, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        Ok(OrderResponse::from_parts(order, items))
    }
}
