//! Cryptographic utilities for Telegram Web App authentication.
//!
//! Mini App requests carry the `initData` query string signed by Telegram.
//! The signature is `HMAC-SHA256(secret_key, data_check_string)` where
//! `secret_key = HMAC-SHA256("WebAppData", bot_token)` and the data check
//! string is every other field as `key=value`, sorted by key, joined by `\n`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Key used to derive the init data secret from the bot token.
const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// Errors from verifying init data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitDataError {
    /// The `hash` field is missing.
    #[error("init data has no hash")]
    MissingHash,

    /// The signature does not match.
    #[error("init data signature mismatch")]
    InvalidSignature,

    /// `auth_date` is missing or not a unix timestamp.
    #[error("init data has no valid auth_date")]
    InvalidAuthDate,

    /// The data is older than the allowed age.
    #[error("init data expired")]
    Expired,

    /// The `user` field is missing or malformed.
    #[error("init data has no valid user")]
    InvalidUser,
}

/// The Telegram user embedded in init data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramUser {
    /// Telegram user id.
    pub id: i64,
    /// Username, if set.
    #[serde(default)]
    pub username: Option<String>,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Verified init data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    /// The authenticated user.
    pub user: TelegramUser,
    /// When Telegram issued the data.
    pub auth_date: DateTime<Utc>,
    /// The `startapp` parameter the Mini App was opened with.
    pub start_param: Option<String>,
}

/// Compute HMAC-SHA256.
///
/// # Errors
///
/// Returns an error if the key is rejected by the HMAC implementation.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

fn data_check_string(fields: &[(String, String)]) -> String {
    let mut pairs: Vec<_> = fields
        .iter()
        .filter(|(key, _)| key != "hash")
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    pairs.sort();
    pairs.join("\n")
}

fn signature(fields: &[(String, String)], bot_token: &str) -> Result<String, InitDataError> {
    let secret = hmac_sha256(WEB_APP_DATA_KEY, bot_token.as_bytes())
        .map_err(|_| InitDataError::InvalidSignature)?;
    let mac = hmac_sha256(&secret, data_check_string(fields).as_bytes())
        .map_err(|_| InitDataError::InvalidSignature)?;
    Ok(hex::encode(mac))
}

/// Verify Telegram Web App init data.
///
/// `max_age` of zero disables the freshness check.
///
/// # Errors
///
/// Returns an [`InitDataError`] describing why the data was rejected.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<InitData, InitDataError> {
    let fields: Vec<(String, String)> = form_urlencoded::parse(init_data.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let field = |name: &str| {
        fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    let hash = field("hash").ok_or(InitDataError::MissingHash)?;
    let expected = signature(&fields, bot_token)?;
    if !constant_time_eq(&expected, &hash.to_ascii_lowercase()) {
        return Err(InitDataError::InvalidSignature);
    }

    let auth_date = field("auth_date")
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or(InitDataError::InvalidAuthDate)?;
    if max_age > chrono::Duration::zero() && now - auth_date > max_age {
        return Err(InitDataError::Expired);
    }

    let user: TelegramUser = field("user")
        .and_then(|json| serde_json::from_str(json).ok())
        .ok_or(InitDataError::InvalidUser)?;

    Ok(InitData {
        user,
        auth_date,
        start_param: field("start_param").map(str::to_string),
    })
}

/// Build a signed init data string, as Telegram would.
///
/// Used by tests and local tooling to impersonate the Mini App.
///
/// # Errors
///
/// Returns an error if the signature cannot be computed.
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> Result<String, InitDataError> {
    let owned: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let hash = signature(&owned, bot_token)?;

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("hash", &hash);
    Ok(serializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:TEST-TOKEN";

    fn signed(auth_date: i64) -> String {
        let auth_date = auth_date.to_string();
        sign_init_data(
            &[
                ("auth_date", &auth_date),
                ("query_id", "AAH"),
                ("user", r#"{"id":6733587823,"first_name":"Ana","username":"ana"}"#),
                ("start_param", "42"),
            ],
            BOT_TOKEN,
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_100, 0).unwrap()
    }

    #[test]
    fn hmac_sha256_produces_correct_length() {
        let result = hmac_sha256(b"key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(result.len(), 32);
        assert_eq!(
            hex::encode(result),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn constant_time_eq_strings() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }

    #[test]
    fn verifies_signed_init_data() {
        let data = verify_init_data(
            &signed(1_700_000_000),
            BOT_TOKEN,
            chrono::Duration::hours(1),
            now(),
        )
        .unwrap();
        assert_eq!(data.user.id, 6_733_587_823);
        assert_eq!(data.user.username.as_deref(), Some("ana"));
        assert_eq!(data.start_param.as_deref(), Some("42"));
    }

    #[test]
    fn rejects_wrong_bot_token() {
        let err = verify_init_data(
            &signed(1_700_000_000),
            "654321:OTHER",
            chrono::Duration::zero(),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, InitDataError::InvalidSignature);
    }

    #[test]
    fn rejects_tampered_field() {
        let tampered = signed(1_700_000_000).replace("AAH", "AAX");
        let err = verify_init_data(&tampered, BOT_TOKEN, chrono::Duration::zero(), now())
            .unwrap_err();
        assert_eq!(err, InitDataError::InvalidSignature);
    }

    #[test]
    fn rejects_stale_data() {
        let err = verify_init_data(
            &signed(1_600_000_000),
            BOT_TOKEN,
            chrono::Duration::hours(1),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, InitDataError::Expired);
    }

    #[test]
    fn rejects_missing_hash() {
        let err = verify_init_data("auth_date=1&user=%7B%7D", BOT_TOKEN, chrono::Duration::zero(), now())
            .unwrap_err();
        assert_eq!(err, InitDataError::MissingHash);
    }
}
