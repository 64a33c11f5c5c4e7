//! Request validation, auth, and collaborator-lookup tests.
//!
//! Everything here is rejected before the ledger touches the database, so
//! the suite runs without a Postgres instance.

mod common;

use common::TestHarness;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn consume_without_auth_fails() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 5,
            "app_id": harness.test_app_id.to_string(),
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn consume_for_another_user_is_forbidden() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("authorization", TestHarness::other_user_auth_header())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 5,
            "app_id": harness.test_app_id.to_string(),
        }))
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn balance_of_another_user_is_forbidden() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get(&format!("/v1/balance/{}", harness.test_user_id))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn admin_endpoints_require_admin_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/admin/grant")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 50,
            "reason": "welcome",
        }))
        .await;
    response.assert_status_unauthorized();

    // The service key is not enough for admin routes.
    let response = harness
        .server
        .post("/v1/admin/grant")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 50,
            "reason": "welcome",
        }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn grant_routes_require_service_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/grants/app-initial")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 50,
        }))
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Input validation
// ============================================================================

#[tokio::test]
async fn consume_rejects_malformed_user_id() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": "not-a-uuid",
            "amount": 5,
            "app_id": harness.test_app_id.to_string(),
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn consume_rejects_non_positive_amount() {
    let harness = TestHarness::new().await;

    for amount in [0, -5] {
        let response = harness
            .server
            .post("/v1/transactions/consume")
            .add_header("x-api-key", &harness.service_api_key)
            .json(&json!({
                "user_id": harness.test_user_id.to_string(),
                "amount": amount,
                "app_id": harness.test_app_id.to_string(),
            }))
            .await;

        response.assert_status_bad_request();
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "validation_error");
    }
}

#[tokio::test]
async fn consume_rejects_malformed_idempotency_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 5,
            "app_id": harness.test_app_id.to_string(),
            "idempotency_key": "has spaces!",
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn history_rejects_unknown_type_filter() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get(&format!(
            "/v1/transactions/{}?type=jackpot",
            harness.test_user_id
        ))
        .add_header("x-api-key", &harness.service_api_key)
        .await;

    response.assert_status_bad_request();
}

// ============================================================================
// App validity
// ============================================================================

#[tokio::test]
async fn consume_unknown_app_is_404() {
    let harness = TestHarness::new().await;
    let app_id = harness.test_app_id;

    Mock::given(method("GET"))
        .and(path(format!("/v1/apps/{app_id}/status")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.collaborators)
        .await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 5,
            "app_id": app_id.to_string(),
        }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn consume_inactive_app_is_403() {
    let harness = TestHarness::new().await;
    let app_id = harness.test_app_id;

    Mock::given(method("GET"))
        .and(path(format!("/v1/apps/{app_id}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_valid": true,
            "is_active": false,
        })))
        .mount(&harness.collaborators)
        .await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 5,
            "app_id": app_id.to_string(),
        }))
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn consume_fails_hard_when_app_directory_is_down() {
    let harness = TestHarness::new().await;
    let app_id = harness.test_app_id;

    Mock::given(method("GET"))
        .and(path(format!("/v1/apps/{app_id}/status")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.collaborators)
        .await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 5,
            "app_id": app_id.to_string(),
        }))
        .await;

    assert_eq!(response.status_code(), 502);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "upstream_unavailable");
}

// ============================================================================
// Pricing
// ============================================================================

#[tokio::test]
async fn consume_rejects_pricing_mismatch() {
    let harness = TestHarness::with_pricing(true).await;

    Mock::given(method("GET"))
        .and(path("/v1/pricing/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "amount": 10 })))
        .mount(&harness.collaborators)
        .await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 12,
            "app_id": harness.test_app_id.to_string(),
            "action": "generate",
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn consume_fails_hard_when_pricing_is_down() {
    let harness = TestHarness::with_pricing(true).await;

    Mock::given(method("GET"))
        .and(path("/v1/pricing/generate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&harness.collaborators)
        .await;

    let response = harness
        .server
        .post("/v1/transactions/consume")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 12,
            "app_id": harness.test_app_id.to_string(),
            "action": "generate",
        }))
        .await;

    assert_eq!(response.status_code(), 502);
}

// ============================================================================
// Grant ceilings
// ============================================================================

#[tokio::test]
async fn initial_grant_over_ceiling_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/grants/app-initial")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 101,
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn streak_bonus_over_ceiling_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/grants/daily-bonus")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "app_id": harness.test_app_id.to_string(),
            "amount": 26,
            "streak_days": 3,
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn streak_day_out_of_range_is_rejected() {
    let harness = TestHarness::new().await;

    for streak_days in [0, 6] {
        let response = harness
            .server
            .post("/v1/grants/daily-bonus")
            .add_header("x-api-key", &harness.service_api_key)
            .json(&json!({
                "user_id": harness.test_user_id.to_string(),
                "app_id": harness.test_app_id.to_string(),
                "amount": 10,
                "streak_days": streak_days,
            }))
            .await;

        response.assert_status_bad_request();
    }
}

// ============================================================================
// Purchases
// ============================================================================

#[tokio::test]
async fn purchase_requires_covering_payment() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/transactions/purchase")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 500,
            "payment_id": "pay_123",
            "payment_amount": 499,
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn admin_adjust_rejects_zero_delta() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/admin/adjust-balance")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "delta": 0,
            "reason": "noop",
        }))
        .await;

    response.assert_status_bad_request();
}
