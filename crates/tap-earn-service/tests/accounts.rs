//! Account integration tests.

mod common;

use axum::http::StatusCode;
use common::{decimal, with, TestHarness};
use tap_earn_core::AccountId;

#[tokio::test]
async fn get_account_requires_auth() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/accounts/me").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn get_account_rejects_forged_init_data() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header(
            axum::http::HeaderName::from_static("authorization"),
            axum::http::HeaderValue::from_static(
                "tma auth_date=1700000000&user=%7B%22id%22%3A1%7D&hash=deadbeef",
            ),
        )
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_account_creates_on_first_contact() {
    let harness = TestHarness::new();

    let response = with(harness.server.get("/v1/accounts/me"), harness.user_auth()).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["id"], harness.test_user_id.get());
    assert_eq!(body["username"], format!("user{}", harness.test_user_id));
    assert_eq!(body["first_name"], "Tester");
    assert_eq!(decimal(&body["balance"]), "0".parse().unwrap());
    assert_eq!(body["energy"], 1000);
    assert_eq!(body["max_energy"], 1000);
    assert_eq!(decimal(&body["tap_value"]), "0.05".parse().unwrap());
    assert_eq!(body["can_withdraw"], true);
}

#[tokio::test]
async fn start_param_links_referrer_on_first_open() {
    let harness = TestHarness::new();
    let referrer = AccountId::new(500);
    harness.fund(referrer, "0".parse().unwrap()).await;

    let newcomer = AccountId::new(501);
    let auth = TestHarness::auth_for(newcomer, Some("500"));
    let response = with(harness.server.get("/v1/accounts/me"), auth).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["referrer_id"], 500);

    let response = with(
        harness.server.get("/v1/accounts/me"),
        TestHarness::auth_for(referrer, None),
    )
    .await;
    let body: serde_json::Value = response.json();
    assert_eq!(decimal(&body["balance"]), "100".parse().unwrap());
    assert_eq!(body["referral_count"], 1);
}

#[tokio::test]
async fn transactions_are_listed_newest_first() {
    let harness = TestHarness::new();

    for _ in 0..3 {
        with(harness.server.post("/v1/taps"), harness.user_auth())
            .await
            .assert_status_ok();
    }

    let response = with(
        harness.server.get("/v1/accounts/me/transactions?limit=2"),
        harness.user_auth(),
    )
    .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(transactions[0]["transaction_type"], "tap");
    assert_eq!(decimal(&transactions[0]["balance_after"]), "0.15".parse().unwrap());
    assert_eq!(decimal(&transactions[1]["balance_after"]), "0.10".parse().unwrap());
}
