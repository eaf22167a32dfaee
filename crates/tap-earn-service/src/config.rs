//! Service configuration.

use std::path::Path;

use serde::Deserialize;
use tap_earn_core::{LedgerConfig, PackageCatalog};

use crate::oracle::DEFAULT_COINGECKO_API_URL;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// `PostgreSQL` connection URL. Without it the in-memory store is used.
    pub database_url: Option<String>,

    /// Maximum pooled database connections (default: 10).
    pub database_max_connections: u32,

    /// Telegram bot token, used to verify Mini App init data.
    pub bot_token: Option<String>,

    /// Telegram bot username, used in referral links.
    pub bot_username: String,

    /// Service API key for the bot process.
    pub service_api_key: Option<String>,

    /// Admin API key for withdrawal settlement and stats.
    pub admin_api_key: Option<String>,

    /// CoinGecko API base URL.
    pub coingecko_api_url: String,

    /// CoinGecko API key (optional).
    pub coingecko_api_key: Option<String>,

    /// How often the TON price is refreshed, in seconds (default: 300).
    pub price_refresh_seconds: u64,

    /// JSON file replacing the default package catalog (optional).
    pub package_catalog_path: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Maximum age of Mini App init data in seconds (0 disables the check).
    pub init_data_max_age_seconds: u64,

    /// Ledger constants.
    pub ledger: LedgerConfig,
}

/// Telegram secrets file structure.
#[derive(Debug, Deserialize)]
struct TelegramSecrets {
    bot_token: String,
    #[serde(default)]
    bot_username: Option<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (bot_token, bot_username) = load_telegram_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: env_parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            bot_token,
            bot_username: bot_username.unwrap_or(defaults.bot_username),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            coingecko_api_url: std::env::var("COINGECKO_API_URL")
                .unwrap_or(defaults.coingecko_api_url),
            coingecko_api_key: std::env::var("COINGECKO_API_KEY").ok(),
            price_refresh_seconds: env_parse("PRICE_REFRESH_SECONDS", defaults.price_refresh_seconds),
            package_catalog_path: std::env::var("PACKAGE_CATALOG_PATH").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            init_data_max_age_seconds: env_parse(
                "INIT_DATA_MAX_AGE_SECONDS",
                defaults.init_data_max_age_seconds,
            ),
            ledger: LedgerConfig::default(),
        }
    }

    /// Load the package catalog, from `package_catalog_path` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid catalog.
    pub fn load_catalog(&self) -> Result<PackageCatalog, Box<dyn std::error::Error + Send + Sync>> {
        let Some(path) = &self.package_catalog_path else {
            return Ok(PackageCatalog::default());
        };
        let contents = std::fs::read_to_string(path)?;
        let catalog = PackageCatalog::from_json(&contents)?;
        tracing::info!(path = %path, packages = catalog.len(), "Loaded package catalog");
        Ok(catalog)
    }

    /// Referral deep link for an account.
    #[must_use]
    pub fn referral_link(&self, account_id: tap_earn_core::AccountId) -> String {
        format!("https://t.me/{}?start={account_id}", self.bot_username)
    }
}

/// Load Telegram secrets from file or environment.
fn load_telegram_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/telegram.json", "../.secrets/telegram.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<TelegramSecrets>(path) {
            tracing::info!(path = %path, "Loaded Telegram secrets from file");
            return (
                Some(secrets.bot_token),
                secrets
                    .bot_username
                    .or_else(|| std::env::var("BOT_USERNAME").ok()),
            );
        }
    }

    tracing::debug!("Telegram secrets file not found, using environment variables");
    (
        std::env::var("BOT_TOKEN").ok(),
        std::env::var("BOT_USERNAME").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            bot_token: None,
            bot_username: "tap_earn_bot".into(),
            service_api_key: None,
            admin_api_key: None,
            coingecko_api_url: DEFAULT_COINGECKO_API_URL.into(),
            coingecko_api_key: None,
            price_refresh_seconds: 300,
            package_catalog_path: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            init_data_max_age_seconds: 86_400,
            ledger: LedgerConfig::default(),
        }
    }
}
