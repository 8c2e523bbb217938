mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{admin, new_order, user};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_core::{
    db,
    errors::ServiceError,
    models::{OrderStatus, PaymentStatus, Role},
    repositories::{
        DocumentOrderRepository, DocumentStore, DocumentUserRepository, Fields, OrderRepository,
        SqlDocumentStore, UserRepository,
    },
};
use uuid::Uuid;

async fn sqlite_store() -> Arc<SqlDocumentStore> {
    let pool = db::establish_connection("sqlite::memory:")
        .await
        .expect("sqlite connection");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(SqlDocumentStore::new(Arc::new(pool)))
}

/// File-backed database so the pool hands out several connections.
async fn file_store(dir: &tempfile::TempDir) -> Arc<SqlDocumentStore> {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display());
    let pool = db::establish_connection(&url)
        .await
        .expect("sqlite connection");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(SqlDocumentStore::new(Arc::new(pool)))
}

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[tokio::test]
async fn test_documents_round_trip_through_sqlite() {
    let store = sqlite_store().await;

    let id = store
        .create("orders", fields(json!({ "userId": "u1", "status": "pending" })))
        .await
        .unwrap();
    let doc = store.get("orders", &id).await.unwrap().expect("stored");
    assert_eq!(doc.fields["userId"], "u1");

    assert!(store.get("users", &id).await.unwrap().is_none());
    assert!(store.get("orders", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_merges_top_level_fields_only() {
    let store = sqlite_store().await;
    let id = store
        .create(
            "orders",
            fields(json!({ "status": "pending", "payment": { "status": "pending", "amount": "10" } })),
        )
        .await
        .unwrap();

    store
        .update("orders", &id, fields(json!({ "status": "shipped" })))
        .await
        .unwrap();

    let doc = store.get("orders", &id).await.unwrap().unwrap();
    assert_eq!(doc.fields["status"], "shipped");
    assert_eq!(doc.fields["payment"]["amount"], "10");

    assert_matches!(
        store.update("orders", "missing", fields(json!({ "status": "x" }))).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn test_query_by_field_filters_within_collection() {
    let store = sqlite_store().await;
    for user in ["u1", "u2", "u1"] {
        store
            .create("orders", fields(json!({ "userId": user })))
            .await
            .unwrap();
    }
    store
        .create("users", fields(json!({ "userId": "u1" })))
        .await
        .unwrap();

    let matches = store
        .query_by_field("orders", "userId", &json!("u1"))
        .await
        .unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(store.list("orders").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_put_replaces_existing_body() {
    let store = sqlite_store().await;
    store
        .put("users", "u1", fields(json!({ "name": "Ada", "role": "customer" })))
        .await
        .unwrap();
    store
        .put("users", "u1", fields(json!({ "name": "Ada Obi" })))
        .await
        .unwrap();

    let doc = store.get("users", "u1").await.unwrap().unwrap();
    assert_eq!(doc.fields["name"], "Ada Obi");
    assert!(doc.fields.get("role").is_none());
}

#[tokio::test]
async fn test_order_repository_over_sqlite() {
    let store = sqlite_store().await;
    let orders = DocumentOrderRepository::new(store.clone());
    let now = Utc::now();

    let older = orders
        .create(new_order("u1", dec!(25.50), now - Duration::minutes(5)))
        .await
        .unwrap();
    let newer = orders.create(new_order("u1", dec!(10), now)).await.unwrap();

    orders.update_status(older.id, OrderStatus::Shipped).await.unwrap();
    let mut payment = older.payment.clone();
    payment.status = PaymentStatus::Completed;
    orders.update_payment(older.id, &payment).await.unwrap();

    let stored = orders.get(older.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Shipped);
    assert_eq!(stored.payment.status, PaymentStatus::Completed);
    assert_eq!(stored.total, dec!(25.50));
    assert_eq!(stored.items, older.items);

    let listed = orders.list_for_user("u1").await.unwrap();
    assert_eq!(listed.iter().map(|o| o.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

    assert_matches!(
        orders.update_status(Uuid::new_v4(), OrderStatus::Shipped).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn test_user_repository_over_sqlite() {
    let store = sqlite_store().await;
    let users = DocumentUserRepository::new(store);
    let now = Utc::now();

    users.save(&admin()).await.unwrap();
    users
        .save(&user("u1", Role::Customer, now - Duration::days(1)))
        .await
        .unwrap();

    let found = users.get("admin-1").await.unwrap().expect("admin stored");
    assert!(found.is_admin());
    assert_eq!(users.list_all().await.unwrap().len(), 2);
    assert!(users.get("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_writes_to_different_fields_both_land_on_pooled_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let orders = DocumentOrderRepository::new(store.clone());

    for _ in 0..25 {
        let order = orders
            .create(new_order("u1", dec!(40), Utc::now()))
            .await
            .unwrap();
        let mut payment = order.payment.clone();
        payment.status = PaymentStatus::Completed;

        let (status_write, payment_write) = tokio::join!(
            orders.update_status(order.id, OrderStatus::Shipped),
            orders.update_payment(order.id, &payment),
        );
        status_write.unwrap();
        payment_write.unwrap();

        let stored = orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert_eq!(stored.payment.status, PaymentStatus::Completed);
        assert_eq!(stored.total, dec!(40));
    }
}

#[tokio::test]
async fn test_update_replaces_nested_values_wholesale() {
    let store = sqlite_store().await;
    let id = store
        .create(
            "orders",
            fields(json!({ "payment": { "status": "pending", "code": "*737#" } })),
        )
        .await
        .unwrap();

    store
        .update(
            "orders",
            &id,
            fields(json!({ "payment": { "status": "completed" }, "note": "paid at branch" })),
        )
        .await
        .unwrap();

    let doc = store.get("orders", &id).await.unwrap().unwrap();
    assert_eq!(doc.fields["payment"], json!({ "status": "completed" }));
    assert_eq!(doc.fields["note"], "paid at branch");
}
