//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - Mini App user authentication via Telegram init data
//! - `ServiceAuth` - Service-to-service authentication via API key (the bot)
//! - `AdminAuth` - Admin authentication for settlement and stats

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tap_earn_core::{AccountId, AccountProfile};

use crate::crypto::{constant_time_eq, verify_init_data};
use crate::error::ApiError;
use crate::state::AppState;

/// Authorization scheme used by Telegram Mini Apps.
const INIT_DATA_SCHEME: &str = "tma ";

/// An authenticated Mini App user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The account id (Telegram user id).
    pub account_id: AccountId,
    /// Profile fields from the init data.
    pub profile: AccountProfile,
    /// The `startapp` parameter, carrying a referrer id on first open.
    pub start_param: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // Allow test tokens in testing only.
            // This bypass is gated behind #[cfg(test)] or the "test-auth" feature
            // to ensure it is never active in production builds.
            #[cfg(any(test, feature = "test-auth"))]
            if let Some(id) = auth_header.strip_prefix("Bearer test-token:") {
                let account_id = id.parse::<AccountId>().map_err(|_| ApiError::Unauthorized)?;

                return Ok(AuthUser {
                    account_id,
                    profile: AccountProfile::default(),
                    start_param: None,
                });
            }

            let init_data = auth_header
                .strip_prefix(INIT_DATA_SCHEME)
                .ok_or(ApiError::Unauthorized)?;

            let bot_token = state.config.bot_token.as_deref().ok_or_else(|| {
                tracing::warn!("Bot token not configured, rejecting Mini App request");
                ApiError::Unauthorized
            })?;

            let max_age = chrono::Duration::seconds(
                i64::try_from(state.config.init_data_max_age_seconds).unwrap_or(i64::MAX),
            );
            let data = verify_init_data(init_data, bot_token, max_age, chrono::Utc::now())
                .map_err(|e| {
                    tracing::debug!(error = %e, "Init data rejected");
                    ApiError::Unauthorized
                })?;

            Ok(AuthUser {
                account_id: AccountId::new(data.user.id),
                profile: AccountProfile {
                    username: data.user.username,
                    first_name: data.user.first_name,
                },
                start_param: data.start_param,
            })
        })
    }
}

/// Service authentication via API key.
///
/// Used by the bot process, e.g. to link referrals from `/start` payloads.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let api_key = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .service_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(api_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            let service_name = parts
                .headers
                .get("x-service-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

/// Admin authentication via API key.
///
/// Requires the `X-Admin-Key` header to match the configured admin key.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let admin_key = parts
                .headers
                .get("x-admin-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .admin_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(admin_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            let admin_id = parts
                .headers
                .get("x-admin-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("admin")
                .to_string();

            tracing::info!(admin_id = %admin_id, "Admin authenticated");

            Ok(AdminAuth { admin_id })
        })
    }
}
