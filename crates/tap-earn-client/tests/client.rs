//! Client tests against a mocked tap-earn service.

use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tap_earn_client::{ClientError, ClientOptions, TapEarnClient};
use tap_earn_core::{AccountId, PackageId, WithdrawalStatus};

const INIT_DATA: &str = "auth_date=1700000000&user=%7B%22id%22%3A42%7D&hash=abc";

async fn setup() -> (MockServer, TapEarnClient) {
    let server = MockServer::start().await;
    let client = TapEarnClient::with_options(
        server.uri(),
        "service-key",
        ClientOptions::with_service_name("tap-earn-bot"),
    )
    .unwrap();
    (server, client)
}

fn error_body(code: &str, message: &str, details: serde_json::Value) -> serde_json::Value {
    json!({ "error": { "code": code, "message": message, "details": details } })
}

#[tokio::test]
async fn link_referral_sends_service_headers() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/referrals"))
        .and(header("x-api-key", "service-key"))
        .and(header("x-service-name", "tap-earn-bot"))
        .and(body_json(json!({ "account_id": 7, "referrer_id": 42 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "linked": true })))
        .expect(1)
        .mount(&server)
        .await;

    let linked = client
        .link_referral(AccountId::new(7), AccountId::new(42))
        .await
        .unwrap();
    assert!(linked);
}

#[tokio::test]
async fn tap_sends_init_data() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/taps"))
        .and(header("authorization", format!("tma {INIT_DATA}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "new_balance": "0.05",
            "energy_remaining": 999,
            "tap_value": "0.05",
            "package_earnings": "0",
            "max_package_earnings": "0",
            "transaction_id": "01HZY3S6J8Q4T2V0N5B7C9D1EF"
        })))
        .mount(&server)
        .await;

    let tap = client.tap(INIT_DATA).await.unwrap();
    assert_eq!(tap.new_balance, dec!(0.05));
    assert_eq!(tap.energy_remaining, Some(999));
}

#[tokio::test]
async fn energy_exhausted_is_typed() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/taps"))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body(
            "energy_exhausted",
            "energy exhausted",
            serde_json::Value::Null,
        )))
        .mount(&server)
        .await;

    let err = client.tap(INIT_DATA).await.unwrap_err();
    assert!(matches!(err, ClientError::EnergyExhausted));
}

#[tokio::test]
async fn get_account_parses_view() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "username": "alice",
            "first_name": "Alice",
            "balance": "33.80",
            "balance_usd": "0.0338",
            "balance_ton": "0.010211480",
            "energy": 1000,
            "max_energy": 1000,
            "unlimited_taps": false,
            "tap_value": "0.05",
            "total_taps": 0,
            "active_package": null,
            "package_earnings": "0",
            "max_package_earnings": "0",
            "referrer_id": null,
            "referral_count": 0,
            "can_withdraw": true,
            "cooldown_until": null,
            "pending_withdrawal": null,
            "created_at": "2026-10-01T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let account = client.get_account(INIT_DATA).await.unwrap();
    assert_eq!(account.id, AccountId::new(42));
    assert_eq!(account.balance, dec!(33.80));
    assert!(account.can_withdraw);
    assert!(account.pending_withdrawal.is_none());
}

#[tokio::test]
async fn list_transactions_sends_paging() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts/me/transactions"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "20"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "transactions": [], "has_more": false })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let page = client.list_transactions(INIT_DATA, 10, 20).await.unwrap();
    assert!(page.transactions.is_empty());
    assert!(!page.has_more);
}

#[tokio::test]
async fn list_packages_flattens_quotes() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/packages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "packages": [{
                "id": "starter",
                "name": "Starter",
                "price": "5",
                "tap_value": "0.25",
                "max_earnings": "7500",
                "unlimited_taps": false,
                "price_in_ton": "1.510574018"
            }]
        })))
        .mount(&server)
        .await;

    let list = client.list_packages().await.unwrap();
    assert_eq!(list.packages.len(), 1);
    let quote = &list.packages[0];
    assert_eq!(quote.package.id, "starter".parse::<PackageId>().unwrap());
    assert_eq!(quote.package.tap_value, dec!(0.25));
    assert_eq!(quote.price_in_ton, Some(dec!(1.510574018)));
}

#[tokio::test]
async fn proof_reuse_is_typed() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/packages/purchase"))
        .and(body_json(json!({ "package_id": "starter", "payment_proof": "tx-1" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(error_body(
            "payment_proof_reused",
            "payment proof already used",
            serde_json::Value::Null,
        )))
        .mount(&server)
        .await;

    let err = client
        .purchase_package(INIT_DATA, "starter".parse().unwrap(), "tx-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PaymentProofReused));
}

#[tokio::test]
async fn withdrawal_round_trip() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/withdrawals"))
        .and(body_json(json!({
            "amount": "0.01",
            "destination_address": "UQwallet",
            "idempotency_key": "w-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "6f1c1d8e-4a3b-4f1e-9c4e-1a2b3c4d5e6f",
            "account_id": 42,
            "amount": "0.01",
            "required_balance": "33.10",
            "destination_address": "UQwallet",
            "status": "pending",
            "requested_at": "2026-10-01T12:00:00+00:00"
        })))
        .mount(&server)
        .await;

    let withdrawal = client
        .request_withdrawal(INIT_DATA, dec!(0.01), "UQwallet", Some("w-1".into()))
        .await
        .unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(withdrawal.required_balance, dec!(33.10));
    assert!(withdrawal.processed_at.is_none());
}

#[tokio::test]
async fn insufficient_balance_carries_details() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/withdrawals"))
        .respond_with(ResponseTemplate::new(402).set_body_json(error_body(
            "insufficient_balance",
            "insufficient balance",
            json!({ "balance": "12.5", "required": "33.1" }),
        )))
        .mount(&server)
        .await;

    let err = client
        .request_withdrawal(INIT_DATA, dec!(0.01), "UQwallet", None)
        .await
        .unwrap_err();
    match err {
        ClientError::InsufficientBalance { balance, required } => {
            assert_eq!(balance, dec!(12.5));
            assert_eq!(required, dec!(33.1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn cooldown_carries_deadline() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/withdrawals"))
        .respond_with(ResponseTemplate::new(409).set_body_json(error_body(
            "on_cooldown",
            "withdrawals on cooldown",
            json!({ "until": "2026-10-02T12:00:00Z" }),
        )))
        .mount(&server)
        .await;

    let err = client
        .request_withdrawal(INIT_DATA, dec!(0.01), "UQwallet", None)
        .await
        .unwrap_err();
    match err {
        ClientError::OnCooldown { until } => assert!(until.is_some()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_codes_fall_back_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/withdrawals"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(
            "below_minimum",
            "amount below minimum",
            json!({ "amount": "0.001", "minimum": "0.01" }),
        )))
        .mount(&server)
        .await;

    let err = client
        .request_withdrawal(INIT_DATA, dec!(0.001), "UQwallet", None)
        .await
        .unwrap_err();
    match err {
        ClientError::Api { code, status, .. } => {
            assert_eq!(code, "below_minimum");
            assert_eq!(status, 400);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_errors_keep_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/price"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client.price().await.unwrap_err();
    match err {
        ClientError::Api { code, status, .. } => {
            assert_eq!(code, "unknown");
            assert_eq!(status, 502);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_is_typed() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/referrals/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(error_body(
            "unauthorized",
            "unauthorized",
            serde_json::Value::Null,
        )))
        .mount(&server)
        .await;

    let err = client.list_referrals(INIT_DATA).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));
}

#[tokio::test]
async fn health_reports_readiness() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "service": "tap-earn",
            "version": "0.1.0",
            "store_ready": true,
            "ton_usd": "3.31",
            "packages": 6
        })))
        .mount(&server)
        .await;

    let health = client.health().await.unwrap();
    assert!(health.store_ready);
    assert_eq!(health.ton_usd, dec!(3.31));
    assert_eq!(health.packages, 6);
}
