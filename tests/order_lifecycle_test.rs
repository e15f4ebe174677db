mod common;

use assert_matches::assert_matches;
use common::{admin, customer, TestApp};
use fulfillment_api::{
    entities::{
        order::{OrderStatus, OrderTransition},
        payment::PaymentStatus,
        shipment::ShipmentStatus,
    },
    errors::ServiceError,
    services::orders::OrderDetail,
};
use rstest::rstest;
use rust_decimal_macros::dec;

async fn placed_order(
    app: &TestApp,
    user_id: i32,
    stock: i32,
    quantity: i32,
) -> (i32, OrderDetail) {
    let lamp = app.seed_product("Lamp", dec!(100), stock).await;
    let ground = app.seed_shipping_method(dec!(10)).await;
    app.fill_cart(user_id, &[(lamp.id, quantity)]).await;
    let detail = app
        .state
        .services
        .checkout
        .checkout(user_id, ground.id, None)
        .await
        .expect("checkout");
    (lamp.id, detail)
}

#[tokio::test]
async fn cancelling_a_confirmed_order_restores_pre_checkout_stock() {
    let app = TestApp::new().await;
    let (lamp, detail) = placed_order(&app, 5, 5, 2).await;
    let status = &app.state.services.order_status;
    assert_eq!(app.stock_of(lamp).await, 3);

    let confirmed = status.confirm_checkout(detail.order.id).await.unwrap();
    assert_eq!(confirmed.status, OrderStatus::Processing);
    assert_eq!(confirmed.stock_debits, 2);
    assert_eq!(app.stock_of(lamp).await, 1);

    let cancelled = status.cancel_order(detail.order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.stock_debits, 0);
    assert_eq!(app.stock_of(lamp).await, 5);
}

#[tokio::test]
async fn cancel_is_not_applied_twice() {
    let app = TestApp::new().await;
    let (lamp, detail) = placed_order(&app, 5, 5, 2).await;
    let status = &app.state.services.order_status;

    status.cancel_order(detail.order.id).await.unwrap();
    assert_eq!(app.stock_of(lamp).await, 5);

    assert_matches!(
        status.cancel_order(detail.order.id).await,
        Err(ServiceError::AlreadyCancelled(id)) if id == detail.order.id
    );
    assert_eq!(app.stock_of(lamp).await, 5);
}

#[tokio::test]
async fn cancel_also_cancels_the_pending_shipment() {
    let app = TestApp::new().await;
    let (_, detail) = placed_order(&app, 5, 5, 1).await;

    app.state
        .services
        .order_status
        .cancel_order(detail.order.id)
        .await
        .unwrap();

    let detail = app
        .state
        .services
        .orders
        .get_order(detail.order.id, &customer(5))
        .await
        .unwrap();
    assert_eq!(
        detail.shipment.map(|s| s.status),
        Some(ShipmentStatus::Cancelled)
    );
}

#[tokio::test]
async fn confirm_is_rejected_once_processing() {
    let app = TestApp::new().await;
    let (lamp, detail) = placed_order(&app, 5, 10, 2).await;
    let status = &app.state.services.order_status;

    status.confirm_checkout(detail.order.id).await.unwrap();
    assert_matches!(
        status.confirm_checkout(detail.order.id).await,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Processing,
            action: OrderTransition::Confirm,
            ..
        })
    );
    assert_eq!(app.stock_of(lamp).await, 6);
}

#[tokio::test]
async fn paying_a_confirmed_order_does_not_reopen_confirm() {
    let app = TestApp::new().await;
    let (lamp, detail) = placed_order(&app, 5, 10, 2).await;
    let method = app.seed_payment_method().await;
    let services = &app.state.services;
    let order_id = detail.order.id;

    let confirmed = services.order_status.confirm_checkout(order_id).await.unwrap();
    assert!(confirmed.confirmed_at.is_some());
    assert_eq!(app.stock_of(lamp).await, 6);

    let payment = services
        .payments
        .create_payment(order_id, method.id, detail.order.total_amount, 5)
        .await
        .unwrap();
    services
        .payments
        .update_payment_status(payment.id, PaymentStatus::Paid)
        .await
        .unwrap();
    let paid = services.orders.find_order(order_id).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);

    assert_matches!(
        services.order_status.confirm_checkout(order_id).await,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Paid,
            action: OrderTransition::Confirm,
            ..
        })
    );
    let order = services.orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.stock_debits, 2);
    assert_eq!(app.stock_of(lamp).await, 6);

    services.order_status.cancel_order(order_id).await.unwrap();
    assert_eq!(app.stock_of(lamp).await, 10);
}

#[tokio::test]
async fn confirm_fails_atomically_when_stock_ran_out() {
    let app = TestApp::new().await;
    let (lamp, detail) = placed_order(&app, 5, 3, 2).await;
    let status = &app.state.services.order_status;
    assert_eq!(app.stock_of(lamp).await, 1);

    assert_matches!(
        status.confirm_checkout(detail.order.id).await,
        Err(ServiceError::InsufficientStock { available: 1, requested: 2, .. })
    );

    let order = app.state.services.orders.find_order(detail.order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.stock_debits, 1);
    assert_eq!(app.stock_of(lamp).await, 1);
}

#[tokio::test]
async fn unknown_orders_are_not_found() {
    let app = TestApp::new().await;
    let status = &app.state.services.order_status;
    assert_matches!(status.confirm_checkout(404).await, Err(ServiceError::OrderNotFound(404)));
    assert_matches!(status.cancel_order(404).await, Err(ServiceError::OrderNotFound(404)));
}

#[rstest]
#[case::cancel_pending(&["cancel"])]
#[case::confirm_then_cancel(&["confirm", "cancel"])]
#[case::pay_confirm_cancel(&["pay", "confirm", "cancel"])]
#[case::confirm_pay_cancel(&["confirm", "pay", "cancel"])]
#[case::cancel_twice(&["cancel", "cancel"])]
#[tokio::test]
async fn cancelled_orders_leave_stock_where_it_started(#[case] steps: &[&str]) {
    let app = TestApp::new().await;
    let (lamp, detail) = placed_order(&app, 5, 20, 3).await;
    let method = app.seed_payment_method().await;
    let order_id = detail.order.id;
    let services = &app.state.services;

    for step in steps {
        match *step {
            "confirm" => {
                services.order_status.confirm_checkout(order_id).await.unwrap();
            }
            "pay" => {
                let payment = services
                    .payments
                    .create_payment(order_id, method.id, dec!(310), 5)
                    .await
                    .unwrap();
                services
                    .payments
                    .update_payment_status(payment.id, PaymentStatus::Paid)
                    .await
                    .unwrap();
            }
            "cancel" => {
                let _ = services.order_status.cancel_order(order_id).await;
            }
            other => panic!("unknown step {}", other),
        }
    }

    let order = services.orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(app.stock_of(lamp).await, 20);
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let (_, detail) = placed_order(&app, 5, 5, 1).await;
    let orders = &app.state.services.orders;

    assert!(orders.get_order(detail.order.id, &customer(5)).await.is_ok());
    assert!(orders.get_order(detail.order.id, &admin()).await.is_ok());
    assert_matches!(
        orders.get_order(detail.order.id, &customer(6)).await,
        Err(ServiceError::Unauthorized(_))
    );
}

#[tokio::test]
async fn order_history_is_newest_first() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(10), 50).await;
    let ground = app.seed_shipping_method(dec!(1)).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        app.fill_cart(8, &[(lamp.id, 1)]).await;
        let detail = app
            .state
            .services
            .checkout
            .checkout(8, ground.id, None)
            .await
            .unwrap();
        ids.push(detail.order.id);
    }

    let (page, total) = app.state.services.orders.list_orders(8, 1, 2).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, ids[2]);
    assert_eq!(page[1].id, ids[1]);

    let (others, total) = app.state.services.orders.list_orders(9, 1, 20).await.unwrap();
    assert!(others.is_empty());
    assert_eq!(total, 0);
}

mod conservation {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn checkout_confirm_cancel_returns_every_unit(
            quantities in proptest::collection::vec(1i32..5, 1..4),
            confirm in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let app = TestApp::new().await;
                let ground = app.seed_shipping_method(dec!(4)).await;
                let mut lines = Vec::new();
                for (i, qty) in quantities.iter().enumerate() {
                    let product = app.seed_product(&format!("Item {}", i), dec!(9.99), 10).await;
                    lines.push((product.id, *qty));
                }
                app.fill_cart(30, &lines).await;

                let services = &app.state.services;
                let detail = services.checkout.checkout(30, ground.id, None).await.unwrap();
                for (product_id, qty) in &lines {
                    assert_eq!(app.stock_of(*product_id).await, 10 - qty);
                }
                if confirm {
                    services.order_status.confirm_checkout(detail.order.id).await.unwrap();
                }
                services.order_status.cancel_order(detail.order.id).await.unwrap();

                for (product_id, _) in &lines {
                    assert_eq!(app.stock_of(*product_id).await, 10);
                }
            });
        }
    }
}
