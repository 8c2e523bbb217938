//! Admin order lifecycle tests.
//!
//! Tests cover:
//! - Permissive, idempotent status changes
//! - Concurrent edits: different fields both land, the same field is last-write-wins
//! - Payment status confirmation by an admin
//! - Role checks on every admin operation
//! - Dashboard statistics and user listing
//! - Order queries for shoppers

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{admin, customer, new_order, shopper, user, Harness};
use rstest::rstest;
use rust_decimal_macros::dec;
use storefront_core::{
    errors::ServiceError,
    events::Event,
    models::{OrderStatus, PaymentStatus, Role},
    repositories::OrderRepository,
    services::orders::OrderQueryService,
};
use uuid::Uuid;

// ==================== Status Transitions ====================

#[rstest]
#[case(OrderStatus::Pending, OrderStatus::Processing)]
#[case(OrderStatus::Processing, OrderStatus::Shipped)]
#[case(OrderStatus::Shipped, OrderStatus::Completed)]
#[case(OrderStatus::Completed, OrderStatus::Processing)]
#[case(OrderStatus::Cancelled, OrderStatus::Pending)]
#[case(OrderStatus::Pending, OrderStatus::Completed)]
#[tokio::test]
async fn test_any_status_may_follow_any_other(#[case] from: OrderStatus, #[case] to: OrderStatus) {
    let mut h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();
    h.orders.update_status(order.id, from).await.unwrap();

    let updated = h.status.set_order_status(&admin(), order.id, to).await.unwrap();

    assert_eq!(updated.status, to);
    assert_eq!(h.stored_order(order.id).await.status, to);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        Event::OrderStatusChanged { old_status, new_status, .. } if *old_status == from && *new_status == to
    )));
}

#[tokio::test]
async fn test_setting_current_status_is_a_no_op() {
    let mut h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();

    let first = h
        .status
        .set_order_status(&admin(), order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    let second = h
        .status
        .set_order_status(&admin(), order.id, OrderStatus::Shipped)
        .await
        .unwrap();

    assert_eq!(first, second);
    let changes = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::OrderStatusChanged { .. }))
        .count();
    assert_eq!(changes, 1);
}

#[tokio::test]
async fn test_status_change_leaves_payment_untouched() {
    let h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();

    h.status
        .set_order_status(&admin(), order.id, OrderStatus::Cancelled)
        .await
        .unwrap();

    let stored = h.stored_order(order.id).await;
    assert_eq!(stored.payment, order.payment);
    assert_eq!(stored.total, order.total);
    assert_eq!(stored.items, order.items);
}

#[tokio::test]
async fn test_admin_confirms_bank_transfer_payment() {
    let mut h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();

    let updated = h
        .status
        .set_payment_status(&admin(), order.id, PaymentStatus::Completed)
        .await
        .unwrap();

    assert_eq!(updated.payment.status, PaymentStatus::Completed);
    assert_eq!(updated.payment.details, order.payment.details);
    assert_eq!(updated.status, OrderStatus::Pending);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        Event::PaymentStatusChanged { new_status: PaymentStatus::Completed, .. }
    )));
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let h = Harness::builder().build();
    let err = h
        .status
        .set_order_status(&admin(), Uuid::new_v4(), OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn test_concurrent_status_and_payment_writes_both_land() {
    let h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();
    let admin = admin();

    let (status, payment) = tokio::join!(
        h.status.set_order_status(&admin, order.id, OrderStatus::Processing),
        h.status.set_payment_status(&admin, order.id, PaymentStatus::Completed),
    );
    status.unwrap();
    payment.unwrap();

    // Each write touches only its own field.
    let stored = h.stored_order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_same_field_writes_are_last_write_wins() {
    let h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();
    let first_admin = admin();
    let second_admin = user("admin-2", Role::Admin, Utc::now());

    // No version check: both writes succeed and whichever lands last stays.
    let (shipped, cancelled) = tokio::join!(
        h.status.set_order_status(&first_admin, order.id, OrderStatus::Shipped),
        h.status.set_order_status(&second_admin, order.id, OrderStatus::Cancelled),
    );
    shipped.unwrap();
    cancelled.unwrap();

    let stored = h.stored_order(order.id).await.status;
    assert!(
        matches!(stored, OrderStatus::Shipped | OrderStatus::Cancelled),
        "unexpected status {:?}",
        stored
    );

    // Sequential writes make the outcome deterministic: the later one wins.
    h.status
        .set_order_status(&first_admin, order.id, OrderStatus::Processing)
        .await
        .unwrap();
    h.status
        .set_order_status(&second_admin, order.id, OrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(h.stored_order(order.id).await.status, OrderStatus::Completed);
}

// ==================== Authorization ====================

#[tokio::test]
async fn test_customers_cannot_use_admin_operations() {
    let h = Harness::builder().build();
    let order = h.orders.create(new_order("user-1", dec!(100), Utc::now())).await.unwrap();
    let customer = customer();

    assert_matches!(
        h.status.set_order_status(&customer, order.id, OrderStatus::Shipped).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        h.status.set_payment_status(&customer, order.id, PaymentStatus::Completed).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(h.status.statistics(&customer).await, Err(ServiceError::Forbidden(_)));
    assert_matches!(h.status.list_users(&customer).await, Err(ServiceError::Forbidden(_)));

    assert_eq!(h.stored_order(order.id).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_admin_email_alone_grants_nothing() {
    let h = Harness::builder().build();
    let mut impostor = customer();
    impostor.email = "admin@gmail.com".into();

    assert_matches!(h.status.statistics(&impostor).await, Err(ServiceError::Forbidden(_)));
}

// ==================== Dashboard ====================

#[tokio::test]
async fn test_statistics_count_every_status() {
    let h = Harness::builder().build();
    let admin = admin();
    let now = Utc::now();

    let totals = [dec!(100), dec!(250.50), dec!(75), dec!(20), dec!(4.50)];
    let statuses = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];
    for (total, status) in totals.iter().zip(statuses) {
        let order = h.orders.create(new_order("user-1", *total, now)).await.unwrap();
        h.orders.update_status(order.id, status).await.unwrap();
    }

    let stats = h.status.statistics(&admin).await.unwrap();
    assert_eq!(stats.total_orders, 5);
    assert_eq!(stats.total_revenue, dec!(450.00));
    assert_eq!(stats.pending_orders, 1);
    assert_eq!(stats.processing_orders, 1);
    assert_eq!(stats.shipped_orders, 1);
    assert_eq!(stats.completed_orders, 1);
    assert_eq!(stats.cancelled_orders, 1);
}

#[tokio::test]
async fn test_users_are_listed_newest_first() {
    let h = Harness::builder().build();
    let now = Utc::now();
    h.users.save(&user("old", Role::Customer, now - Duration::days(3))).await.unwrap();
    h.users.save(&user("new", Role::Customer, now)).await.unwrap();
    h.users.save(&user("mid", Role::Admin, now - Duration::days(1))).await.unwrap();

    let users = h.status.list_users(&admin()).await.unwrap();
    let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);
}

// ==================== Order Queries ====================

#[tokio::test]
async fn test_shopper_sees_only_own_orders_newest_first() {
    let h = Harness::builder().build();
    let queries = OrderQueryService::new(h.orders.clone());
    let now = Utc::now();

    let older = h
        .orders
        .create(new_order("user-1", dec!(10), now - Duration::hours(2)))
        .await
        .unwrap();
    let newer = h.orders.create(new_order("user-1", dec!(20), now)).await.unwrap();
    let foreign = h.orders.create(new_order("user-2", dec!(30), now)).await.unwrap();

    let mine = queries.list_for_user("user-1").await.unwrap();
    assert_eq!(
        mine.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![newer.id, older.id]
    );

    let viewer = shopper();
    assert_eq!(queries.get_for_user(newer.id, &viewer).await.unwrap().id, newer.id);
    assert_matches!(
        queries.get_for_user(foreign.id, &viewer).await,
        Err(ServiceError::NotFound(_))
    );

    assert_eq!(queries.list_all(&admin()).await.unwrap().len(), 3);
    assert_matches!(queries.list_all(&customer()).await, Err(ServiceError::Forbidden(_)));
}
