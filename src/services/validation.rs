//! Order request validation.
//!
//! The service loads everything a request refers to into a
//! `ValidationContext`, then a pure rule pass evaluates the request against
//! it. All failures are accumulated; the caller gets the full list, not the
//! first problem found. Nothing here mutates state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{customer, customer_address, farm, product};
use crate::errors::{ServiceError, ValidationIssue};
use crate::models::{FarmStatus, FulfillmentMethod};

use super::orders::CreateOrderRequest;

/// How far out a pickup or delivery may be scheduled.
const SCHEDULING_HORIZON_DAYS: i64 = 30;

/// Everything a creation request refers to, loaded up front so the rule pass
/// can stay pure.
#[derive(Debug, Default)]
pub struct ValidationContext {
    pub customer: Option<customer::Model>,
    pub farm: Option<farm::Model>,
    pub products: HashMap<Uuid, product::Model>,
    pub delivery_address: Option<customer_address::Model>,
}

#[derive(Debug, Clone)]
pub struct OrderValidationService {
    db: Arc<DbPool>,
}

impl OrderValidationService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Loads the context and evaluates the rules; returns the context on
    /// success so order creation can reuse the loaded models.
    #[instrument(skip(self, request))]
    pub async fn validate(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<ValidationContext, ServiceError> {
        let context = self.load_context(request).await?;
        let issues = evaluate(request, &context, Utc::now());
        if issues.is_empty() {
            Ok(context)
        } else {
            Err(ServiceError::ValidationFailed(issues))
        }
    }

    async fn load_context(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<ValidationContext, ServiceError> {
        let customer = customer::Entity::find_by_id(request.customer_id)
            .one(&*self.db)
            .await?;

        let farm = farm::Entity::find_by_id(request.farm_id)
            .one(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        let products = if product_ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let delivery_address = match request.delivery_address_id {
            Some(address_id) => {
                customer_address::Entity::find_by_id(address_id)
                    .one(&*self.db)
                    .await?
            }
            None => None,
        };

        Ok(ValidationContext {
            customer,
            farm,
            products,
            delivery_address,
        })
    }
}

/// Pure rule pass over `(request, context, now)`.
pub fn evaluate(
    request: &CreateOrderRequest,
    context: &ValidationContext,
    now: DateTime<Utc>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    match &context.customer {
        None => issues.push(ValidationIssue::new(
            "customer_id",
            "CUSTOMER_NOT_FOUND",
            format!("Customer {} does not exist", request.customer_id),
        )),
        Some(customer) if !customer.is_active => issues.push(ValidationIssue::new(
            "customer_id",
            "CUSTOMER_INACTIVE",
            format!("Customer {} is inactive", request.customer_id),
        )),
        Some(_) => {}
    }

    match &context.farm {
        None => issues.push(ValidationIssue::new(
            "farm_id",
            "FARM_NOT_FOUND",
            format!("Farm {} does not exist", request.farm_id),
        )),
        Some(farm) if farm.status != FarmStatus::Active => issues.push(ValidationIssue::new(
            "farm_id",
            "FARM_INACTIVE",
            format!("Farm {} is not accepting orders", farm.name),
        )),
        Some(_) => {}
    }

    if request.items.is_empty() {
        issues.push(ValidationIssue::new(
            "items",
            "NO_ITEMS",
            "Order must contain at least one item",
        ));
    }

    for (index, item) in request.items.iter().enumerate() {
        let field = format!("items[{}]", index);

        if item.quantity <= 0 {
            issues.push(ValidationIssue::new(
                &field,
                "INVALID_QUANTITY",
                format!("Quantity must be positive, got {}", item.quantity),
            ));
        }

        match context.products.get(&item.product_id) {
            None => issues.push(ValidationIssue::new(
                &field,
                "PRODUCT_NOT_FOUND",
                format!("Product {} does not exist", item.product_id),
            )),
            Some(product) => {
                if product.farm_id != request.farm_id {
                    issues.push(ValidationIssue::new(
                        &field,
                        "PRODUCT_WRONG_FARM",
                        format!("Product {} belongs to a different farm", product.name),
                    ));
                }
                if !product.is_active {
                    issues.push(ValidationIssue::new(
                        &field,
                        "PRODUCT_NOT_AVAILABLE",
                        format!("Product {} is not available", product.name),
                    ));
                }
                if item.quantity > 0 && product.quantity_available < item.quantity {
                    issues.push(ValidationIssue::new(
                        &field,
                        "INSUFFICIENT_STOCK",
                        format!(
                            "Only {} of {} available, {} requested",
                            product.quantity_available, product.name, item.quantity
                        ),
                    ));
                }
            }
        }
    }

    if request.fulfillment_method == FulfillmentMethod::Delivery {
        match request.delivery_address_id {
            None => issues.push(ValidationIssue::new(
                "delivery_address_id",
                "DELIVERY_ADDRESS_REQUIRED",
                "Delivery orders require a delivery address",
            )),
            Some(address_id) => match &context.delivery_address {
                None => issues.push(ValidationIssue::new(
                    "delivery_address_id",
                    "ADDRESS_NOT_FOUND",
                    format!("Address {} does not exist", address_id),
                )),
                Some(address) if address.customer_id != request.customer_id => {
                    issues.push(ValidationIssue::new(
                        "delivery_address_id",
                        "ADDRESS_NOT_OWNED",
                        "Delivery address does not belong to the customer",
                    ))
                }
                Some(_) => {}
            },
        }
    }

    if let Some(discount) = request.discount {
        if discount < rust_decimal::Decimal::ZERO {
            issues.push(ValidationIssue::new(
                "discount",
                "INVALID_DISCOUNT",
                format!("Discount must not be negative, got {}", discount),
            ));
        }
    }

    if let Some(scheduled_date) = request.scheduled_date {
        let today = now.date_naive();
        let horizon = today + Duration::days(SCHEDULING_HORIZON_DAYS);
        if scheduled_date < today || scheduled_date > horizon {
            issues.push(ValidationIssue::new(
                "scheduled_date",
                "INVALID_SCHEDULED_DATE",
                format!(
                    "Scheduled date must fall between {} and {}",
                    today, horizon
                ),
            ));
        }
    }

    issues
}
