mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use farmdirect_api::errors::ServiceError;
use farmdirect_api::models::{FulfillmentMethod, PaymentMethod, PaymentStatus, RefundStatus};
use farmdirect_api::services::orders::{CreateOrderItem, CreateOrderRequest, OrderResponse};
use farmdirect_api::services::payments::{
    ConfirmPaymentOutcome, CreatePaymentIntentRequest, PaymentResponse, RefundPaymentRequest,
};

async fn seed_order(test: &common::TestDb) -> OrderResponse {
    let svc = common::order_service(&test.db);
    let customer = common::seed_customer(&test.db).await;
    let farm = common::seed_farm(&test.db).await;
    let product = common::seed_product(&test.db, farm.id, dec!(10.00), 20).await;

    svc.create_order(CreateOrderRequest {
        customer_id: customer.id,
        farm_id: farm.id,
        fulfillment_method: FulfillmentMethod::Pickup,
        items: vec![CreateOrderItem {
            product_id: product.id,
            quantity: 2,
        }],
        delivery_address_id: None,
        scheduled_date: None,
        time_slot: None,
        discount: None,
        notes: None,
    })
    .await
    .expect("order created")
}

fn intent_request(order: &OrderResponse, method: PaymentMethod) -> CreatePaymentIntentRequest {
    CreatePaymentIntentRequest {
        amount: order.totals.total,
        currency: order.currency.clone(),
        method,
    }
}

async fn pay_in_full(
    test: &common::TestDb,
    order: &OrderResponse,
    method: PaymentMethod,
) -> PaymentResponse {
    let payments = common::payment_service(&test.db);
    payments
        .create_payment_intent(order.id, intent_request(order, method))
        .await
        .expect("intent created");
    match payments.confirm_payment(order.id).await.expect("captured") {
        ConfirmPaymentOutcome::Captured { payment } => payment,
        other => panic!("expected capture, got {:?}", other),
    }
}

#[tokio::test]
async fn intent_and_capture_update_order_payment_status() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    let intent = payments
        .create_payment_intent(order.id, intent_request(&order, PaymentMethod::Card))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentStatus::Pending);
    assert!(intent.intent_reference.as_deref().unwrap().starts_with("pi_"));
    // fee = 2.9% + 0.30 on 21.60
    assert_eq!(intent.fee, dec!(0.93));
    assert_eq!(intent.net, intent.amount - intent.fee);

    let captured = match payments.confirm_payment(order.id).await.unwrap() {
        ConfirmPaymentOutcome::Captured { payment } => payment,
        other => panic!("expected capture, got {:?}", other),
    };
    assert_eq!(captured.status, PaymentStatus::Completed);
    assert!(captured.transaction_id.is_some());
    assert!(captured.completed_at.is_some());

    let orders = common::order_service(&test.db);
    let paid = orders.get_order(order.id).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn confirm_is_idempotent_after_capture() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    pay_in_full(&test, &order, PaymentMethod::Card).await;

    // Second confirm: no pending payment, order already paid
    let outcome = payments.confirm_payment(order.id).await.unwrap();
    assert_matches!(outcome, ConfirmPaymentOutcome::AlreadyCaptured);

    // Still exactly one payment row
    let all = payments.list_payments_for_order(order.id).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn racing_confirms_capture_exactly_once() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    payments
        .create_payment_intent(order.id, intent_request(&order, PaymentMethod::Card))
        .await
        .unwrap();

    let racer = || {
        let payments = payments.clone();
        let order_id = order.id;
        async move { payments.confirm_payment(order_id).await }
    };
    let (a, b) = tokio::join!(racer(), racer());

    let captures = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|outcome| matches!(outcome, ConfirmPaymentOutcome::Captured { .. }))
        .count();
    assert_eq!(captures, 1, "exactly one confirm should capture");

    let all = payments.list_payments_for_order(order.id).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, PaymentStatus::Completed);
    assert!(all[0].transaction_id.is_some());
}

#[tokio::test]
async fn confirm_without_intent_is_not_found() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    let err = payments.confirm_payment(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn intent_amount_must_match_order_total() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    let err = payments
        .create_payment_intent(
            order.id,
            CreatePaymentIntentRequest {
                amount: order.totals.total + dec!(1.00),
                currency: order.currency.clone(),
                method: PaymentMethod::Card,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
}

#[tokio::test]
async fn full_refund_flips_payment_and_order_to_refunded() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    let captured = pay_in_full(&test, &order, PaymentMethod::Paypal).await;

    let refund = payments
        .refund_payment(
            captured.id,
            RefundPaymentRequest {
                amount: None,
                reason: Some("order cancelled".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.amount, captured.amount);
    assert!(refund.provider_reference.is_some());

    let after = payments.get_payment(captured.id).await.unwrap();
    assert_eq!(after.status, PaymentStatus::Refunded);
    assert_eq!(after.refunded_amount, captured.amount);

    let orders = common::order_service(&test.db);
    assert_eq!(
        orders.get_order(order.id).await.unwrap().payment_status,
        PaymentStatus::Refunded
    );
}

#[tokio::test]
async fn partial_refunds_accumulate_and_cap_at_the_captured_amount() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    let captured = pay_in_full(&test, &order, PaymentMethod::Card).await;
    // total is 21.60 (20.00 subtotal + 1.60 tax)
    assert_eq!(captured.amount, dec!(21.60));

    payments
        .refund_payment(
            captured.id,
            RefundPaymentRequest {
                amount: Some(dec!(10.00)),
                reason: None,
            },
        )
        .await
        .unwrap();

    // Partial refund leaves the payment COMPLETED
    let mid = payments.get_payment(captured.id).await.unwrap();
    assert_eq!(mid.status, PaymentStatus::Completed);
    assert_eq!(mid.refunded_amount, dec!(10.00));

    // Refunding more than the remainder is rejected
    let err = payments
        .refund_payment(
            captured.id,
            RefundPaymentRequest {
                amount: Some(dec!(12.00)),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    // Refunding exactly the remainder completes the refund
    payments
        .refund_payment(
            captured.id,
            RefundPaymentRequest {
                amount: Some(dec!(11.60)),
                reason: None,
            },
        )
        .await
        .unwrap();

    let after = payments.get_payment(captured.id).await.unwrap();
    assert_eq!(after.status, PaymentStatus::Refunded);
    assert_eq!(after.refunded_amount, dec!(21.60));

    // A further refund has nothing left to take
    let err = payments
        .refund_payment(
            captured.id,
            RefundPaymentRequest {
                amount: Some(dec!(0.01)),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let refunds = payments.list_refunds(captured.id).await.unwrap();
    assert_eq!(refunds.len(), 2);
    assert_eq!(
        refunds.iter().map(|r| r.amount).sum::<Decimal>(),
        dec!(21.60)
    );
}

#[tokio::test]
async fn racing_partial_refunds_cannot_exceed_the_captured_amount() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    // 21.60 captured; two refunds of 12.00 each must not both land
    let captured = pay_in_full(&test, &order, PaymentMethod::Card).await;

    let racer = |amount| {
        let payments = payments.clone();
        let payment_id = captured.id;
        async move {
            payments
                .refund_payment(
                    payment_id,
                    RefundPaymentRequest {
                        amount: Some(amount),
                        reason: None,
                    },
                )
                .await
        }
    };
    let (a, b) = tokio::join!(racer(dec!(12.00)), racer(dec!(12.00)));

    assert!(a.is_ok() != b.is_ok(), "exactly one refund should win");
    let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert_matches!(
        loser,
        ServiceError::Conflict(_) | ServiceError::InvalidOperation(_)
    );

    let after = payments.get_payment(captured.id).await.unwrap();
    assert_eq!(after.refunded_amount, dec!(12.00));
    assert_eq!(after.status, PaymentStatus::Completed);

    // The loser's refund row rolled back with its transaction
    let refunds = payments.list_refunds(captured.id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, dec!(12.00));
}

#[tokio::test]
async fn refunding_an_uncaptured_payment_is_rejected() {
    let test = common::setup().await;
    let order = seed_order(&test).await;
    let payments = common::payment_service(&test.db);

    let intent = payments
        .create_payment_intent(order.id, intent_request(&order, PaymentMethod::Card))
        .await
        .unwrap();

    let err = payments
        .refund_payment(
            intent.id,
            RefundPaymentRequest {
                amount: None,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn cancelling_a_paid_order_signals_refund_due() {
    let test = common::setup().await;
    let order = seed_order(&test).await;

    pay_in_full(&test, &order, PaymentMethod::Card).await;

    let orders = common::order_service(&test.db);
    let outcome = orders
        .cancel_order(order.id, Some("farm ran out".to_string()), None)
        .await
        .unwrap();
    assert!(outcome.refund_due);
}
