//! Common test utilities for tap-earn integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::{TestRequest, TestServer};
use chrono::Utc;
use rust_decimal::Decimal;

use tap_earn_core::{AccountId, LedgerConfig, PackageCatalog};
use tap_earn_service::crypto::sign_init_data;
use tap_earn_service::{create_router, AppState, FixedPriceOracle, ServiceConfig};
use tap_earn_store::{MemoryStore, Store};

/// Bot token used to sign test init data.
pub const BOT_TOKEN: &str = "123456:TEST-BOT-TOKEN";

/// TON/USD quote served by the test oracle.
pub const TON_USD: Decimal = Decimal::from_parts(331, 0, 0, false, 2);

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for seeding and inspection.
    pub store: Arc<MemoryStore>,
    /// A test user for authenticated requests.
    pub test_user_id: AccountId,
    /// The service API key for bot requests.
    pub service_api_key: String,
    /// The admin API key.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            bot_token: Some(BOT_TOKEN.into()),
            bot_username: "tap_earn_test_bot".into(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            ..ServiceConfig::default()
        };

        let ledger_config = LedgerConfig::default();
        let oracle = Arc::new(FixedPriceOracle::new(TON_USD, ledger_config.points_per_usd));
        let state = AppState::new(store.clone(), oracle, PackageCatalog::default(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            test_user_id: AccountId::new(6_733_587_823),
            service_api_key,
            admin_api_key,
        }
    }

    /// Authorization header carrying freshly signed init data for `id`.
    pub fn auth_for(id: AccountId, start_param: Option<&str>) -> (HeaderName, HeaderValue) {
        let auth_date = Utc::now().timestamp().to_string();
        let user = format!(r#"{{"id":{id},"first_name":"Tester","username":"user{id}"}}"#);

        let mut fields = vec![("auth_date", auth_date.as_str()), ("user", user.as_str())];
        if let Some(param) = start_param {
            fields.push(("start_param", param));
        }

        let init_data = sign_init_data(&fields, BOT_TOKEN).expect("Failed to sign init data");
        let value = HeaderValue::from_str(&format!("tma {init_data}")).expect("Invalid header");
        (HeaderName::from_static("authorization"), value)
    }

    /// Authorization header for the test user.
    pub fn user_auth(&self) -> (HeaderName, HeaderValue) {
        Self::auth_for(self.test_user_id, None)
    }

    /// Service API key header.
    pub fn service_auth(&self) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(&self.service_api_key).expect("Invalid header"),
        )
    }

    /// Admin API key header.
    pub fn admin_auth(&self) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-admin-key"),
            HeaderValue::from_str(&self.admin_api_key).expect("Invalid header"),
        )
    }

    /// Create `id` if needed and set its balance.
    pub async fn fund(&self, id: AccountId, balance: Decimal) {
        let mut account = self
            .store
            .get_or_create_account(id, None, &LedgerConfig::default(), Utc::now())
            .await
            .expect("Failed to create account");
        account.balance = balance;
        self.store
            .put_account(&account)
            .await
            .expect("Failed to fund account");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach a header pair to a request.
pub fn with(request: TestRequest, header: (HeaderName, HeaderValue)) -> TestRequest {
    request.add_header(header.0, header.1)
}

/// Read a decimal field serialized as a JSON string.
pub fn decimal(value: &serde_json::Value) -> Decimal {
    value
        .as_str()
        .expect("decimal fields serialize as strings")
        .parse()
        .expect("invalid decimal")
}
