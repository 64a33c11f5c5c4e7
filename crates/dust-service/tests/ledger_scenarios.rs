//! End-to-end ledger scenarios against a real Postgres instance.
//!
//! These tests exercise the full critical section — lock, database
//! transaction, uniqueness backstops — and therefore need a database. Run
//! them with a scratch instance:
//!
//! ```sh
//! TEST_DATABASE_URL=postgres://localhost/dust_test cargo test -- --ignored
//! ```
//!
//! Every test funds its own freshly generated user, so no cleanup between
//! runs is required.

mod common;

use common::TestHarness;
use serde_json::json;

use dust_store::balances;

async fn harness_with_db() -> TestHarness {
    let harness = TestHarness::new().await;
    harness.store.migrate().await.expect("migrations");
    harness
}

/// Fund the harness user through the admin grant endpoint.
async fn fund(harness: &TestHarness, amount: i64) {
    harness
        .server
        .post("/v1/admin/grant")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": amount,
            "reason": "Test funding",
        }))
        .await
        .assert_status_ok();
}

async fn get_balance(harness: &TestHarness) -> i64 {
    let response = harness
        .server
        .get(&format!("/v1/balance/{}", harness.test_user_id))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["balance"].as_i64().unwrap()
}

fn consume_body(harness: &TestHarness, amount: i64, idem_key: &str) -> serde_json::Value {
    json!({
        "user_id": harness.test_user_id.to_string(),
        "amount": amount,
        "app_id": harness.test_app_id.to_string(),
        "action": "generate",
        "idempotency_key": idem_key,
    })
}

// ============================================================================
// Scenario A: insufficient balance
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn consume_exceeding_balance_is_rejected_and_balance_unchanged() {
    let harness = harness_with_db().await;
    fund(&harness, 10).await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&consume_body(&harness, 15, "scenario-a"))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(body["error"]["details"]["balance"], 10);
    assert_eq!(body["error"]["details"]["required"], 15);

    assert_eq!(get_balance(&harness).await, 10);
}

// ============================================================================
// Scenario B: idempotent consume
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn retried_consume_with_same_key_applies_once() {
    let harness = harness_with_db().await;
    fund(&harness, 10).await;

    let first = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&consume_body(&harness, 4, "scenario-b"))
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();
    assert_eq!(first["transaction"]["amount"], -4);
    assert_eq!(first["balance_after"], 6);

    let second = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&consume_body(&harness, 4, "scenario-b"))
        .await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();

    assert_eq!(second["transaction"]["id"], first["transaction"]["id"]);
    assert_eq!(second["balance_after"], 6);
    assert_eq!(get_balance(&harness).await, 6);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn concurrent_consume_with_same_key_creates_one_transaction() {
    let harness = harness_with_db().await;
    fund(&harness, 10).await;

    let body = consume_body(&harness, 4, "scenario-b-concurrent");
    let (a, b) = tokio::join!(
        harness
            .server
            .post("/v1/transactions/consume")
            .add_header("x-api-key", &harness.service_api_key)
            .json(&body),
        harness
            .server
            .post("/v1/transactions/consume")
            .add_header("x-api-key", &harness.service_api_key)
            .json(&body),
    );

    // One caller wins; the other either replays the winner's commit or,
    // if it arrived before the commit, receives a retryable 409.
    let statuses = [a.status_code(), b.status_code()];
    assert!(statuses.iter().all(|s| *s == 200 || *s == 409));
    assert!(statuses.iter().any(|s| *s == 200));

    assert_eq!(get_balance(&harness).await, 6);

    // Exactly one ledger row for the deduction.
    let history = harness
        .server
        .get(&format!(
            "/v1/transactions/{}?type=consume",
            harness.test_user_id
        ))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    history.assert_status_ok();
    let history: serde_json::Value = history.json();
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Scenario C: refunds
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn refund_credits_once_and_second_attempt_conflicts() {
    let harness = harness_with_db().await;
    fund(&harness, 10).await;

    let consume = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&consume_body(&harness, 4, "scenario-c"))
        .await;
    consume.assert_status_ok();
    let consume: serde_json::Value = consume.json();
    let original_id = consume["transaction"]["id"].as_str().unwrap().to_string();

    let refund = harness
        .server
        .post("/v1/admin/refund")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({ "transaction_id": original_id, "reason": "support" }))
        .await;
    refund.assert_status_ok();
    let refund: serde_json::Value = refund.json();
    assert_eq!(refund["transaction"]["type"], "refund");
    assert_eq!(refund["transaction"]["amount"], 4);
    assert_eq!(
        refund["transaction"]["metadata"]["refunded_transaction_id"],
        original_id
    );
    assert_eq!(get_balance(&harness).await, 10);

    let again = harness
        .server
        .post("/v1/admin/refund")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({ "transaction_id": original_id, "reason": "support" }))
        .await;
    assert_eq!(again.status_code(), 409);
    let body: serde_json::Value = again.json();
    assert_eq!(body["error"]["code"], "already_refunded");
    assert_eq!(get_balance(&harness).await, 10);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn refund_of_a_grant_is_rejected() {
    let harness = harness_with_db().await;
    fund(&harness, 10).await;

    let history = harness
        .server
        .get(&format!(
            "/v1/transactions/{}?type=grant",
            harness.test_user_id
        ))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    let history: serde_json::Value = history.json();
    let grant_id = history["transactions"][0]["id"].as_str().unwrap();

    let response = harness
        .server
        .post("/v1/admin/refund")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({ "transaction_id": grant_id, "reason": "oops" }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_refund_target");
}

// ============================================================================
// Scenario D: initial grant idempotency
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn initial_grant_is_issued_once_regardless_of_idempotency_keys() {
    let harness = harness_with_db().await;

    let first = harness
        .server
        .post("/v1/grants/app-initial")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 100,
            "idempotency_key": "initial-1",
        }))
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();

    let second = harness
        .server
        .post("/v1/grants/app-initial")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 100,
            "idempotency_key": "initial-2",
        }))
        .await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();

    assert_eq!(second["transaction"]["id"], first["transaction"]["id"]);
    assert_eq!(get_balance(&harness).await, 100);
}

// ============================================================================
// Streak bonuses
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn streak_bonus_claims_once_per_day() {
    let harness = harness_with_db().await;

    let first = harness
        .server
        .post("/v1/grants/daily-bonus")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 10,
            "streak_days": 1,
        }))
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();
    assert_eq!(first["transaction"]["metadata"]["streak"], 1);

    let second = harness
        .server
        .post("/v1/grants/daily-bonus")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 10,
            "streak_days": 2,
        }))
        .await;
    assert_eq!(second.status_code(), 409);

    assert_eq!(get_balance(&harness).await, 10);
}

// ============================================================================
// Purchases and adjustments
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn purchase_credits_dust_one_to_one() {
    let harness = harness_with_db().await;

    let response = harness
        .server
        .post("/v1/transactions/purchase")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 500,
            "payment_id": "pay_abc",
            "payment_amount": 500,
            "idempotency_key": "purchase-1",
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["transaction"]["type"], "purchase");
    assert_eq!(body["transaction"]["amount"], 500);
    assert_eq!(get_balance(&harness).await, 500);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn negative_adjustment_cannot_cross_zero() {
    let harness = harness_with_db().await;
    fund(&harness, 10).await;

    let response = harness
        .server
        .post("/v1/admin/adjust-balance")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "delta": -15,
            "reason": "correction",
        }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(get_balance(&harness).await, 10);
}

// ============================================================================
// Ledger consistency
// ============================================================================

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL Postgres"]
async fn balance_equals_sum_of_completed_transactions() {
    let harness = harness_with_db().await;
    fund(&harness, 100).await;

    for (amount, key) in [(7, "audit-1"), (13, "audit-2")] {
        harness
            .server
            .post("/v1/transactions/consume")
            .add_header("x-api-key", &harness.service_api_key)
            .json(&consume_body(&harness, amount, key))
            .await
            .assert_status_ok();
    }

    let balance = balances::get(&harness.store, &harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    let ledger_sum = balances::sum_completed(&harness.store, &harness.test_user_id)
        .await
        .unwrap();

    assert_eq!(balance.amount, 80);
    assert_eq!(balance.amount, ledger_sum);
}
