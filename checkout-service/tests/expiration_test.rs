//! Expiration sweeps and cancellation.

mod common;

use checkout_service::services::Store;
use chrono::{Duration, Utc};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

/// Move a transaction's deadline into the past.
async fn backdate_transaction(app: &TestApp, transaction_id: Uuid) {
    let mut uow = app.store.begin().await.unwrap();
    let mut tx = uow.get_transaction(transaction_id, true).await.unwrap().unwrap();
    tx.expires_at = Utc::now() - Duration::seconds(1);
    uow.update_transaction(&tx).await.unwrap();
    uow.commit().await.unwrap();
}

async fn backdate_payments(app: &TestApp, transaction_id: Uuid) {
    let mut uow = app.store.begin().await.unwrap();
    for mut payment in uow.payments_for_transaction(transaction_id).await.unwrap() {
        payment.expires_at = Utc::now() - Duration::seconds(1);
        uow.update_payment(&payment).await.unwrap();
    }
    uow.commit().await.unwrap();
}

async fn sweep(app: &TestApp) -> Value {
    let response = app.admin_post("/admin/expirations/sweep", &json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn lapsed_transaction_and_payment_expire_together() {
    let app = TestApp::spawn().await;
    let package_id = app.seed_package("100000").await;
    app.seed_gateway_method("BCA_VA", "2000").await;
    app.mock_charge("ch_late").await;

    let user = Uuid::new_v4();
    let transaction_id = app.create_transaction(user, package_id, None).await;
    let response = app.initiate_payment(user, transaction_id, "BCA_VA").await;
    assert_eq!(response.status().as_u16(), 200);

    backdate_transaction(&app, transaction_id).await;

    let report = sweep(&app).await;
    assert_eq!(report["transactions_expired"], 1);
    assert_eq!(report["payments_expired"], 1);

    let tx = app.transaction(user, transaction_id).await;
    assert_eq!(tx["status"], "expired");
    assert_eq!(tx["payment"]["status"], "expired");

    // Idempotent.
    let report = sweep(&app).await;
    assert_eq!(report["transactions_expired"], 0);
    assert_eq!(report["payments_expired"], 0);

    // A paid callback after expiry does not revive anything.
    let ack: Value = app
        .callback(&json!({ "external_id": "ch_late", "status": "PAID" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ack["result"], "ignored");
    let tx = app.transaction(user, transaction_id).await;
    assert_eq!(tx["status"], "expired");
}

#[tokio::test]
async fn reads_sweep_lazily() {
    let app = TestApp::spawn().await;
    let package_id = app.seed_package("100000").await;
    let user = Uuid::new_v4();
    let transaction_id = app.create_transaction(user, package_id, None).await;

    backdate_transaction(&app, transaction_id).await;

    let tx = app.transaction(user, transaction_id).await;
    assert_eq!(tx["status"], "expired");

    let response = app.initiate_payment(user, transaction_id, "BCA_VA").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn lapsed_payment_reopens_transaction_without_fee() {
    let app = TestApp::spawn().await;
    let package_id = app.seed_package("100000").await;
    app.seed_gateway_method("BCA_VA", "2000").await;
    app.mock_charge("ch_slow").await;

    let user = Uuid::new_v4();
    let transaction_id = app.create_transaction(user, package_id, None).await;
    app.initiate_payment(user, transaction_id, "BCA_VA").await;
    backdate_payments(&app, transaction_id).await;

    let report = sweep(&app).await;
    assert_eq!(report["transactions_expired"], 0);
    assert_eq!(report["payments_expired"], 1);

    let tx = app.transaction(user, transaction_id).await;
    assert_eq!(tx["status"], "pending");
    assert_eq!(tx["payment"]["status"], "expired");
    assert_eq!(money(&tx["service_fee_amount"]), dec!(0));
    assert_eq!(money(&tx["final_amount"]), dec!(100000));
}

#[tokio::test]
async fn cancel_closes_open_transactions_only() {
    let app = TestApp::spawn().await;
    let package_id = app.seed_package("100000").await;
    let user = Uuid::new_v4();
    let transaction_id = app.create_transaction(user, package_id, None).await;
    let cancel_path = format!("/transactions/{}/cancel", transaction_id);

    let response = app.post_as(Uuid::new_v4(), &cancel_path, &json!({})).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.post_as(user, &cancel_path, &json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");

    let response = app.post_as(user, &cancel_path, &json!({})).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn listing_is_newest_first() {
    let app = TestApp::spawn().await;
    let package_id = app.seed_package("100000").await;
    let user = Uuid::new_v4();
    let first = app.create_transaction(user, package_id, None).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = app.create_transaction(user, package_id, None).await;
    app.create_transaction(Uuid::new_v4(), package_id, None).await;

    let list: Vec<Value> = app
        .get_as(user, "/transactions")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], second.to_string());
    assert_eq!(list[1]["id"], first.to_string());
}

#[tokio::test]
async fn stalled_processing_payment_lapses_and_reopens_transaction() {
    let app = TestApp::spawn().await;
    let package_id = app.seed_package("100000").await;
    app.seed_gateway_method("BCA_VA", "2000").await;
    app.mock_charge("ch_stuck").await;

    let user = Uuid::new_v4();
    let transaction_id = app.create_transaction(user, package_id, None).await;
    app.initiate_payment(user, transaction_id, "BCA_VA").await;
    let ack: Value = app
        .callback(&json!({ "external_id": "ch_stuck", "status": "PROCESSING" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ack["result"], "processing");

    backdate_payments(&app, transaction_id).await;
    let report = sweep(&app).await;
    assert_eq!(report["payments_expired"], 1);

    let tx = app.transaction(user, transaction_id).await;
    assert_eq!(tx["status"], "pending");
    assert_eq!(tx["payment"]["status"], "expired");
    assert_eq!(money(&tx["final_amount"]), dec!(100000));

    let response = app.initiate_payment(user, transaction_id, "BCA_VA").await;
    assert_eq!(response.status().as_u16(), 200);
}
