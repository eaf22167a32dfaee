//! Tap-Earn HTTP client implementation.

use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use rust_decimal::Decimal;
use tap_earn_core::{AccountId, PackageId};

use crate::error::ClientError;
use crate::types::{
    AccountResponse, ApiErrorResponse, CreateWithdrawalRequest, HealthResponse,
    LinkReferralRequest, LinkReferralResponse, ListPackagesResponse, ListTransactionsResponse,
    ListWithdrawalsResponse, PriceResponse, PurchaseRequest, PurchaseResponse, ReferralsResponse,
    TapResponse, WithdrawalResponse,
};

/// Tap-Earn API client.
///
/// Service calls authenticate with the API key. User calls take the Mini App
/// init data of the user they act for.
#[derive(Debug, Clone)]
pub struct TapEarnClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl TapEarnClient {
    /// Create a new tap-earn client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the tap-earn service (e.g., `"http://tap-earn:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new tap-earn client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the base URL is empty or the
    /// HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Configuration("base URL is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    // =========================================================================
    // Service endpoints (API key)
    // =========================================================================

    /// Link `account_id` to the referrer named in its `/start` payload.
    ///
    /// Returns `false` when the account already had a referrer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn link_referral(
        &self,
        account_id: AccountId,
        referrer_id: AccountId,
    ) -> Result<bool, ClientError> {
        let url = format!("{}/v1/referrals", self.base_url);
        let request = LinkReferralRequest {
            account_id,
            referrer_id,
        };

        let response = self.service(self.client.post(&url)).json(&request).send().await?;

        let body: LinkReferralResponse = self.handle_response(response).await?;
        Ok(body.linked)
    }

    // =========================================================================
    // User endpoints (Mini App init data)
    // =========================================================================

    /// Get (or open) the account of the init data's user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_account(&self, init_data: &str) -> Result<AccountResponse, ClientError> {
        let url = format!("{}/v1/accounts/me", self.base_url);
        let response = self.user(self.client.get(&url), init_data).send().await?;
        self.handle_response(response).await
    }

    /// List the user's ledger transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_transactions(
        &self,
        init_data: &str,
        limit: usize,
        offset: usize,
    ) -> Result<ListTransactionsResponse, ClientError> {
        let url = format!("{}/v1/accounts/me/transactions", self.base_url);
        let response = self
            .user(self.client.get(&url), init_data)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Tap once.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::EnergyExhausted` or `ClientError::PackageCapReached`
    /// when the tap is refused, or another error if the request fails.
    pub async fn tap(&self, init_data: &str) -> Result<TapResponse, ClientError> {
        let url = format!("{}/v1/taps", self.base_url);
        let response = self.user(self.client.post(&url), init_data).send().await?;
        self.handle_response(response).await
    }

    /// List the package catalog with TON prices.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_packages(&self) -> Result<ListPackagesResponse, ClientError> {
        let url = format!("{}/v1/packages", self.base_url);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Activate a package paid for with the given TON payment proof.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::PaymentProofReused` if the proof already bought
    /// something else, or another error if the request fails.
    pub async fn purchase_package(
        &self,
        init_data: &str,
        package_id: PackageId,
        payment_proof: impl Into<String>,
    ) -> Result<PurchaseResponse, ClientError> {
        let url = format!("{}/v1/packages/purchase", self.base_url);
        let request = PurchaseRequest {
            package_id,
            payment_proof: payment_proof.into(),
        };

        let response = self
            .user(self.client.post(&url), init_data)
            .json(&request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// The user's referral link and referred accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_referrals(&self, init_data: &str) -> Result<ReferralsResponse, ClientError> {
        let url = format!("{}/v1/referrals/me", self.base_url);
        let response = self.user(self.client.get(&url), init_data).send().await?;
        self.handle_response(response).await
    }

    /// Request a withdrawal of `amount` TON to a wallet.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InsufficientBalance`, `ClientError::OnCooldown` or
    /// `ClientError::WithdrawalAlreadyPending` when refused, or another error
    /// if the request fails.
    pub async fn request_withdrawal(
        &self,
        init_data: &str,
        amount: Decimal,
        destination_address: impl Into<String>,
        idempotency_key: Option<String>,
    ) -> Result<WithdrawalResponse, ClientError> {
        let url = format!("{}/v1/withdrawals", self.base_url);
        let request = CreateWithdrawalRequest {
            amount,
            destination_address: destination_address.into(),
            idempotency_key,
        };

        let response = self
            .user(self.client.post(&url), init_data)
            .json(&request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// The user's withdrawal history.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_withdrawals(
        &self,
        init_data: &str,
    ) -> Result<ListWithdrawalsResponse, ClientError> {
        let url = format!("{}/v1/withdrawals/me", self.base_url);
        let response = self.user(self.client.get(&url), init_data).send().await?;
        self.handle_response(response).await
    }

    // =========================================================================
    // Public endpoints
    // =========================================================================

    /// Current TON price.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn price(&self) -> Result<PriceResponse, ClientError> {
        let url = format!("{}/v1/price", self.base_url);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Service health.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    fn service(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
    }

    #[allow(clippy::unused_self)]
    fn user(&self, request: RequestBuilder, init_data: &str) -> RequestBuilder {
        request.header("authorization", format!("tma {init_data}"))
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        let Ok(api_error) = error_body else {
            return Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            });
        };

        let code = api_error.error.code.as_str();
        let details = api_error.error.details.as_ref();
        tracing::debug!(
            service = %self.service_name,
            status = status.as_u16(),
            code,
            "tap-earn request rejected"
        );

        // Map specific error codes to typed errors
        match code {
            "unauthorized" => Err(ClientError::Unauthorized),
            "energy_exhausted" => Err(ClientError::EnergyExhausted),
            "package_cap_reached" => Err(ClientError::PackageCapReached),
            "payment_proof_reused" => Err(ClientError::PaymentProofReused),
            "insufficient_balance" => Err(ClientError::InsufficientBalance {
                balance: detail(details, "balance").unwrap_or_default(),
                required: detail(details, "required").unwrap_or_default(),
            }),
            "on_cooldown" => Err(ClientError::OnCooldown {
                until: detail(details, "until"),
            }),
            "withdrawal_already_pending" => Err(ClientError::WithdrawalAlreadyPending),
            _ => Err(ClientError::Api {
                code: code.to_string(),
                message: api_error.error.message,
                status: status.as_u16(),
            }),
        }
    }
}

fn detail<T: serde::de::DeserializeOwned>(
    details: Option<&serde_json::Value>,
    key: &str,
) -> Option<T> {
    details
        .and_then(|d| d.get(key))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
