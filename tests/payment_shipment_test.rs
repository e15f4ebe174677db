mod common;

use assert_matches::assert_matches;
use common::{admin, customer, TestApp};
use fulfillment_api::{
    entities::{
        order::{OrderStatus, OrderTransition},
        payment::PaymentStatus,
        payment_method,
        shipment::{self, ShipmentStatus},
    },
    errors::ServiceError,
    services::{
        orders::OrderDetail,
        payment_methods::{CreatePaymentMethodInput, UpdatePaymentMethodInput},
        payments::PaymentFilter,
        shipments::{CreateShipmentRequest, ShipmentFilter, UpdateShipmentRequest},
        shipping_methods::{CreateShippingMethodInput, UpdateShippingMethodInput},
    },
};
use sea_orm::{EntityTrait, ModelTrait};
use rust_decimal_macros::dec;

struct Placed {
    detail: OrderDetail,
    method: payment_method::Model,
}

async fn placed_order(app: &TestApp, user_id: i32) -> Placed {
    let lamp = app.seed_product("Lamp", dec!(100), 10).await;
    let ground = app.seed_shipping_method(dec!(10)).await;
    let method = app.seed_payment_method().await;
    app.fill_cart(user_id, &[(lamp.id, 2)]).await;
    let detail = app
        .state
        .services
        .checkout
        .checkout(user_id, ground.id, None)
        .await
        .expect("checkout");
    Placed { detail, method }
}

fn ship(status: ShipmentStatus) -> UpdateShipmentRequest {
    UpdateShipmentRequest {
        tracking_number: None,
        status: Some(status),
    }
}

#[tokio::test]
async fn settling_a_payment_as_paid_marks_the_order_paid() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let order_id = placed.detail.order.id;
    let payments = &app.state.services.payments;

    let payment = payments
        .create_payment(order_id, placed.method.id, dec!(210), 4)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.paid_at.is_none());

    let settled = payments
        .update_payment_status(payment.id, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Paid);
    assert!(settled.paid_at.is_some());

    let order = app.state.services.orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    assert_matches!(
        payments
            .create_payment(order_id, placed.method.id, dec!(210), 4)
            .await,
        Err(ServiceError::AlreadyPaid(id)) if id == order_id
    );
    assert_matches!(
        payments.update_payment_status(payment.id, PaymentStatus::Failed).await,
        Err(ServiceError::PaymentNotPending { status: PaymentStatus::Paid, .. })
    );
}

#[tokio::test]
async fn one_pending_payment_per_order() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let order_id = placed.detail.order.id;
    let payments = &app.state.services.payments;

    let first = payments
        .create_payment(order_id, placed.method.id, dec!(210), 4)
        .await
        .unwrap();
    assert_matches!(
        payments
            .create_payment(order_id, placed.method.id, dec!(210), 4)
            .await,
        Err(ServiceError::PendingPaymentExists(_))
    );

    // A failed attempt frees the order for a retry.
    payments
        .update_payment_status(first.id, PaymentStatus::Failed)
        .await
        .unwrap();
    let retry = payments
        .create_payment(order_id, placed.method.id, dec!(210), 4)
        .await
        .unwrap();
    assert_ne!(retry.id, first.id);

    let order = app.state.services.orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let history = payments
        .list_order_payments(order_id, &customer(4))
        .await
        .unwrap();
    assert_eq!(
        history.iter().map(|p| p.status).collect::<Vec<_>>(),
        vec![PaymentStatus::Failed, PaymentStatus::Pending]
    );
}

#[tokio::test]
async fn payments_are_refused_for_foreign_cancelled_or_bad_requests() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let order_id = placed.detail.order.id;
    let payments = &app.state.services.payments;

    assert_matches!(
        payments
            .create_payment(order_id, placed.method.id, dec!(210), 99)
            .await,
        Err(ServiceError::Unauthorized(_))
    );
    assert_matches!(
        payments.create_payment(order_id, placed.method.id, dec!(0), 4).await,
        Err(ServiceError::InvalidInput(_))
    );
    assert_matches!(
        payments.create_payment(order_id, 777, dec!(210), 4).await,
        Err(ServiceError::PaymentMethodNotFound(777))
    );
    assert_matches!(
        payments.create_payment(404, placed.method.id, dec!(210), 4).await,
        Err(ServiceError::OrderNotFound(404))
    );
    assert_matches!(
        payments.update_payment_status(404, PaymentStatus::Paid).await,
        Err(ServiceError::PaymentNotFound(404))
    );

    app.state
        .services
        .order_status
        .cancel_order(order_id)
        .await
        .unwrap();
    assert_matches!(
        payments
            .create_payment(order_id, placed.method.id, dec!(210), 4)
            .await,
        Err(ServiceError::InvalidInput(_))
    );
}

#[tokio::test]
async fn payments_are_visible_to_owner_and_admin_only() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let payments = &app.state.services.payments;
    let payment = payments
        .create_payment(placed.detail.order.id, placed.method.id, dec!(210), 4)
        .await
        .unwrap();

    assert!(payments.get_payment(payment.id, &customer(4)).await.is_ok());
    assert!(payments.get_payment(payment.id, &admin()).await.is_ok());
    assert_matches!(
        payments.get_payment(payment.id, &customer(5)).await,
        Err(ServiceError::Unauthorized(_))
    );
}

#[tokio::test]
async fn shipping_requires_a_paid_order_and_delivery_completes_it() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let order_id = placed.detail.order.id;
    let shipment_id = placed.detail.shipment.as_ref().unwrap().id;
    let shipments = &app.state.services.shipments;

    assert_matches!(
        shipments.update_shipment(shipment_id, ship(ShipmentStatus::Shipped)).await,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Pending,
            action: OrderTransition::Ship,
            ..
        })
    );
    let unchanged = shipments.get_shipment(shipment_id, &admin()).await.unwrap();
    assert_eq!(unchanged.status, ShipmentStatus::Pending);

    let payment = app
        .state
        .services
        .payments
        .create_payment(order_id, placed.method.id, dec!(210), 4)
        .await
        .unwrap();
    app.state
        .services
        .payments
        .update_payment_status(payment.id, PaymentStatus::Paid)
        .await
        .unwrap();

    let shipped = shipments
        .update_shipment(
            shipment_id,
            UpdateShipmentRequest {
                tracking_number: Some("1Z999".to_string()),
                status: Some(ShipmentStatus::Shipped),
            },
        )
        .await
        .unwrap();
    assert_eq!(shipped.status, ShipmentStatus::Shipped);
    assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999"));
    assert!(shipped.shipped_at.is_some());

    let order = app.state.services.orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);

    assert_matches!(
        app.state.services.order_status.cancel_order(order_id).await,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Shipped,
            ..
        })
    );

    let delivered = shipments
        .update_shipment(shipment_id, ship(ShipmentStatus::Delivered))
        .await
        .unwrap();
    assert!(delivered.delivered_at.is_some());
    let order = app.state.services.orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);

    assert_matches!(
        shipments.update_shipment(shipment_id, ship(ShipmentStatus::Shipped)).await,
        Err(ServiceError::InvalidInput(_))
    );
}

#[tokio::test]
async fn shipments_of_cancelled_orders_cannot_move() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let shipment_id = placed.detail.shipment.as_ref().unwrap().id;

    app.state
        .services
        .order_status
        .cancel_order(placed.detail.order.id)
        .await
        .unwrap();

    assert_matches!(
        app.state
            .services
            .shipments
            .update_shipment(shipment_id, ship(ShipmentStatus::Processing))
            .await,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Cancelled,
            ..
        })
    );
}

#[tokio::test]
async fn tracking_number_can_be_set_without_moving_the_shipment() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let shipment_id = placed.detail.shipment.as_ref().unwrap().id;

    let updated = app
        .state
        .services
        .shipments
        .update_shipment(
            shipment_id,
            UpdateShipmentRequest {
                tracking_number: Some("  TRK-1  ".to_string()),
                status: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, ShipmentStatus::Pending);
    assert_eq!(updated.tracking_number.as_deref(), Some("TRK-1"));

    assert_matches!(
        app.state
            .services
            .shipments
            .get_shipment(shipment_id, &customer(5))
            .await,
        Err(ServiceError::Unauthorized(_))
    );
}

async fn pay(app: &TestApp, placed: &Placed, user_id: i32) {
    let payments = &app.state.services.payments;
    let payment = payments
        .create_payment(
            placed.detail.order.id,
            placed.method.id,
            placed.detail.order.total_amount,
            user_id,
        )
        .await
        .unwrap();
    payments
        .update_payment_status(payment.id, PaymentStatus::Paid)
        .await
        .unwrap();
}

fn shipment_for(order_id: i32, shipping_method_id: i32) -> CreateShipmentRequest {
    CreateShipmentRequest {
        order_id,
        shipping_method_id,
        tracking_number: Some(" TRK-1 ".to_string()),
    }
}

#[tokio::test]
async fn a_missing_shipment_can_be_reopened_for_paid_orders_only() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let order_id = placed.detail.order.id;
    let method_id = placed.detail.shipment.as_ref().unwrap().shipping_method_id;
    let shipments = &app.state.services.shipments;

    assert_matches!(
        shipments.create_shipment(shipment_for(order_id, method_id)).await,
        Err(ServiceError::InvalidTransition { from: OrderStatus::Pending, .. })
    );

    pay(&app, &placed, 4).await;
    assert_matches!(
        shipments.create_shipment(shipment_for(order_id, method_id)).await,
        Err(ServiceError::Conflict(_))
    );

    let original = shipment::Entity::find_by_id(placed.detail.shipment.unwrap().id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    original.delete(app.db()).await.unwrap();

    assert_matches!(
        shipments.create_shipment(shipment_for(order_id, 9_999)).await,
        Err(ServiceError::ShippingMethodNotFound(9_999))
    );
    let created = shipments
        .create_shipment(shipment_for(order_id, method_id))
        .await
        .unwrap();
    assert_eq!(created.order_id, order_id);
    assert_eq!(created.status, ShipmentStatus::Pending);
    assert_eq!(created.tracking_number.as_deref(), Some("TRK-1"));

    let shipped = shipments
        .update_shipment(created.id, ship(ShipmentStatus::Shipped))
        .await
        .unwrap();
    assert_eq!(shipped.status, ShipmentStatus::Shipped);
}

#[tokio::test]
async fn shipment_listing_filters_by_status_and_order() {
    let app = TestApp::new().await;
    let first = placed_order(&app, 4).await;
    let second = placed_order(&app, 5).await;
    pay(&app, &second, 5).await;
    let shipments = &app.state.services.shipments;
    let second_shipment = second.detail.shipment.as_ref().unwrap().id;
    shipments
        .update_shipment(second_shipment, ship(ShipmentStatus::Shipped))
        .await
        .unwrap();

    let (all, total) = shipments
        .list_shipments(ShipmentFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(all[0].id, second_shipment, "newest first");

    let (shipped, total) = shipments
        .list_shipments(
            ShipmentFilter {
                status: Some(ShipmentStatus::Shipped),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(shipped[0].order_id, second.detail.order.id);

    let (of_first, total) = shipments
        .list_shipments(
            ShipmentFilter {
                order_id: Some(first.detail.order.id),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(of_first[0].status, ShipmentStatus::Pending);

    let (none, total) = shipments
        .list_shipments(
            ShipmentFilter {
                created_from: Some(chrono::Utc::now() + chrono::Duration::days(1)),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert!(none.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn payment_listing_spans_orders() {
    let app = TestApp::new().await;
    let first = placed_order(&app, 4).await;
    let second = placed_order(&app, 5).await;
    pay(&app, &first, 4).await;
    app.state
        .services
        .payments
        .create_payment(second.detail.order.id, second.method.id, dec!(1), 5)
        .await
        .unwrap();
    let payments = &app.state.services.payments;

    let (all, total) = payments
        .list_payments(PaymentFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);

    let (pending, total) = payments
        .list_payments(
            PaymentFilter {
                status: Some(PaymentStatus::Pending),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(pending[0].order_id, second.detail.order.id);

    let (page, total) = payments
        .list_payments(PaymentFilter::default(), 2, 1)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn deleted_shipping_methods_disappear_from_checkout() {
    let app = TestApp::new().await;
    let methods = &app.state.services.shipping_methods;
    let lamp = app.seed_product("Lamp", dec!(20), 5).await;

    assert_matches!(
        methods
            .create_shipping_method(CreateShippingMethodInput {
                name: "Broken".to_string(),
                cost: dec!(-1),
                estimated_days: 2,
                description: None,
            })
            .await,
        Err(ServiceError::InvalidInput(_))
    );

    let express = methods
        .create_shipping_method(CreateShippingMethodInput {
            name: " Express ".to_string(),
            cost: dec!(15),
            estimated_days: 1,
            description: Some("Next day".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(express.name, "Express");

    let express = methods
        .update_shipping_method(
            express.id,
            UpdateShippingMethodInput {
                cost: Some(dec!(12)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(express.cost, dec!(12));
    assert_eq!(express.estimated_days, 1);

    let (listed, total) = methods
        .list_shipping_methods(Some("exp".to_string()), 1, 20)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(listed[0].id, express.id);

    app.fill_cart(9, &[(lamp.id, 1)]).await;
    let detail = app
        .state
        .services
        .checkout
        .checkout(9, express.id, None)
        .await
        .unwrap();
    assert_eq!(detail.order.total_amount, dec!(32));

    methods.delete_shipping_method(express.id).await.unwrap();
    assert_matches!(
        methods.get_shipping_method(express.id).await,
        Err(ServiceError::ShippingMethodNotFound(_))
    );
    app.fill_cart(9, &[(lamp.id, 1)]).await;
    assert_matches!(
        app.state.services.checkout.checkout(9, express.id, None).await,
        Err(ServiceError::ShippingMethodNotFound(_))
    );
}

#[tokio::test]
async fn deleted_payment_methods_cannot_open_payments() {
    let app = TestApp::new().await;
    let placed = placed_order(&app, 4).await;
    let methods = &app.state.services.payment_methods;

    let wallet = methods
        .create_payment_method(CreatePaymentMethodInput {
            name: "Wallet".to_string(),
            description: None,
        })
        .await
        .unwrap();
    let wallet = methods
        .update_payment_method(
            wallet.id,
            UpdatePaymentMethodInput {
                description: Some("Stored balance".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(wallet.description.as_deref(), Some("Stored balance"));

    let (all, total) = methods.list_payment_methods(None, 1, 20).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(all[0].name, "Card");

    methods.delete_payment_method(wallet.id).await.unwrap();
    assert_matches!(
        app.state
            .services
            .payments
            .create_payment(placed.detail.order.id, wallet.id, dec!(210), 4)
            .await,
        Err(ServiceError::PaymentMethodNotFound(id)) if id == wallet.id
    );
    assert_matches!(
        methods.delete_payment_method(wallet.id).await,
        Err(ServiceError::PaymentMethodNotFound(_))
    );
}
