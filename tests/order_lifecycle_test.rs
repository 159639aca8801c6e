mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use farmdirect_api::entities::{
    customer as customer_entity, farm as farm_entity, order as order_entity, product,
};
use farmdirect_api::errors::ServiceError;
use farmdirect_api::models::{FulfillmentMethod, OrderStatus, PaymentStatus};
use farmdirect_api::services::orders::{
    CreateOrderItem, CreateOrderRequest, OrderListFilter, UpdateOrderStatusRequest,
};

fn pickup_request(
    customer_id: uuid::Uuid,
    farm_id: uuid::Uuid,
    items: Vec<CreateOrderItem>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id,
        farm_id,
        fulfillment_method: FulfillmentMethod::Pickup,
        items,
        delivery_address_id: None,
        scheduled_date: None,
        time_slot: None,
        discount: None,
        notes: None,
    }
}

#[tokio::test]
async fn create_order_reserves_inventory_and_snapshots_prices() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let order = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 3,
            }],
        ))
        .await
        .expect("order created");

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].price_at_purchase, dec!(4.50));
    assert_eq!(order.totals.subtotal, dec!(13.50));
    assert_eq!(
        order.totals.total,
        order.totals.subtotal + order.totals.delivery_fee + order.totals.tax
            - order.totals.discount
    );

    // Stock was decremented atomically
    let remaining = product::Entity::find_by_id(product.id)
        .one(&*test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remaining.quantity_available, 7);

    // Order number is date-scoped with a 4-digit sequence
    let expected_prefix = format!("ORD-{}-", Utc::now().format("%Y%m%d"));
    assert!(order.order_number.starts_with(&expected_prefix));
    assert_eq!(order.order_number.len(), expected_prefix.len() + 4);
}

#[tokio::test]
async fn order_numbers_increment_within_the_day() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(2.00), 100).await;

    let first = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();
    let second = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    assert!(first.order_number.ends_with("-0001"));
    assert!(second.order_number.ends_with("-0002"));
}

#[tokio::test]
async fn failed_validation_reserves_nothing() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 5).await;

    let err = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![
                CreateOrderItem {
                    product_id: product.id,
                    quantity: 2,
                },
                CreateOrderItem {
                    product_id: uuid::Uuid::new_v4(),
                    quantity: 1,
                },
            ],
        ))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationFailed(issues) => {
        assert!(issues.iter().any(|i| i.code == "PRODUCT_NOT_FOUND"));
    });

    let untouched = product::Entity::find_by_id(product.id)
        .one(&*test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.quantity_available, 5);
}

#[tokio::test]
async fn lifecycle_walks_the_transition_table() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let order = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Fulfilled,
        OrderStatus::Completed,
    ] {
        let outcome = svc
            .update_status(
                order.id,
                UpdateOrderStatusRequest {
                    status,
                    reason: None,
                    cancelled_by: None,
                },
            )
            .await
            .expect("transition allowed");
        assert_eq!(outcome.order.status, status);
    }

    let completed = svc.get_order(order.id).await.unwrap();
    assert!(completed.updated_at.is_some());

    // Terminal: nothing leaves COMPLETED
    let err = svc
        .update_status(
            order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Pending,
                reason: None,
                cancelled_by: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidStatusTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Pending,
        }
    );
}

#[tokio::test]
async fn skipping_states_is_rejected() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let order = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    let err = svc
        .update_status(
            order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Fulfilled,
                reason: None,
                cancelled_by: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatusTransition { .. });

    // Self-transitions are not in the table either
    let err = svc
        .update_status(
            order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Pending,
                reason: None,
                cancelled_by: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatusTransition { .. });
}

#[tokio::test]
async fn late_cancellation_reports_the_fresh_status() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let order = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Fulfilled,
    ] {
        svc.update_status(
            order.id,
            UpdateOrderStatusRequest {
                status,
                reason: None,
                cancelled_by: None,
            },
        )
        .await
        .unwrap();
    }

    // The cancel request lost to the fulfillment advance; the error names
    // the state the order is actually in
    let err = svc
        .cancel_order(order.id, Some("too late".to_string()), None)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidStatusTransition {
            from: OrderStatus::Fulfilled,
            to: OrderStatus::Cancelled,
        }
    );
}

#[tokio::test]
async fn cancellation_releases_inventory_and_records_reason() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let order = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 4,
            }],
        ))
        .await
        .unwrap();

    let outcome = svc
        .cancel_order(
            order.id,
            Some("changed my mind".to_string()),
            Some("customer".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Cancelled);
    assert_eq!(outcome.order.cancel_reason.as_deref(), Some("changed my mind"));
    assert_eq!(outcome.order.cancelled_by.as_deref(), Some("customer"));
    // Unpaid order: no refund owed
    assert!(!outcome.refund_due);

    let restored = product::Entity::find_by_id(product.id)
        .one(&*test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.quantity_available, 10);
}

#[tokio::test]
async fn listing_filters_by_status_and_customer() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer_a = common::seed_customer(&test.db).await;
    let customer_b = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(1.00), 100).await;

    for customer in [&customer_a, &customer_a, &customer_b] {
        svc.create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();
    }

    let (all, total) = svc
        .list_orders(OrderListFilter::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(all.len(), 3);
    // Newest first
    assert!(all[0].created_at >= all[2].created_at);

    let (for_a, total_a) = svc
        .list_orders(
            OrderListFilter {
                customer_id: Some(customer_a.id),
                ..Default::default()
            },
            1,
            10,
        )
        .await
        .unwrap();
    assert_eq!(total_a, 2);
    assert!(for_a.iter().all(|o| o.customer_id == customer_a.id));

    let (pending, _) = svc
        .list_orders(
            OrderListFilter {
                status: Some(OrderStatus::Pending),
                ..Default::default()
            },
            1,
            10,
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 3);

    let (cancelled, _) = svc
        .list_orders(
            OrderListFilter {
                status: Some(OrderStatus::Cancelled),
                ..Default::default()
            },
            1,
            10,
        )
        .await
        .unwrap();
    assert!(cancelled.is_empty());
}

#[tokio::test]
async fn discounts_are_bounded_by_the_order_charges() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(5.00), 50).await;

    let base = |discount| {
        let mut request = pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 2,
            }],
        );
        request.discount = Some(discount);
        request
    };

    // A negative discount would inflate the total
    let err = svc.create_order(base(dec!(-1000.00))).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(issues) => {
        assert!(issues.iter().any(|i| i.code == "INVALID_DISCOUNT"));
    });

    // A discount above the charges would make the order unpayable
    let err = svc.create_order(base(dec!(1000.00))).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(issues) => {
        assert!(issues.iter().any(|i| i.code == "DISCOUNT_EXCEEDS_TOTAL"));
    });

    // Neither rejected attempt reserved stock
    let untouched = product::Entity::find_by_id(product.id)
        .one(&*test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.quantity_available, 50);

    // A sane discount goes through and reduces the total
    let order = svc.create_order(base(dec!(2.00))).await.unwrap();
    assert_eq!(order.totals.discount, dec!(2.00));
    assert_eq!(
        order.totals.total,
        order.totals.subtotal + order.totals.delivery_fee + order.totals.tax - dec!(2.00)
    );
    assert!(order.totals.total > rust_decimal::Decimal::ZERO);
}

#[tokio::test]
async fn orders_join_back_to_customer_and_farm() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let order = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    let (_, linked_customer) = order_entity::Entity::find_by_id(order.id)
        .find_also_related(customer_entity::Entity)
        .one(&*test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked_customer.unwrap().id, customer.id);

    let (_, linked_farm) = order_entity::Entity::find_by_id(order.id)
        .find_also_related(farm_entity::Entity)
        .one(&*test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked_farm.unwrap().id, farm.id);
}

#[tokio::test]
async fn get_by_number_round_trips() {
    let test = common::setup().await;
    let svc = common::order_service(&test.db);

    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(4.50), 10).await;

    let created = svc
        .create_order(pickup_request(
            customer.id,
            farm.id,
            vec![CreateOrderItem {
                product_id: product.id,
                quantity: 1,
            }],
        ))
        .await
        .unwrap();

    let fetched = svc
        .get_order_by_number(&created.order_number)
        .await
        .unwrap();
    assert_eq!(fetched.id, created.id);

    let err = svc.get_order_by_number("ORD-19700101-0001").await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
