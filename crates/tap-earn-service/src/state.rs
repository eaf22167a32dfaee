//! Application state.

use std::sync::Arc;

use tap_earn_core::PackageCatalog;
use tap_earn_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;
use crate::oracle::PriceOracle;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ledger service.
    pub ledger: Arc<Ledger>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn PriceOracle>,
        catalog: PackageCatalog,
        config: ServiceConfig,
    ) -> Self {
        if config.bot_token.is_none() {
            tracing::warn!("Bot token not configured - Mini App requests will be rejected");
        }
        if config.service_api_key.is_none() {
            tracing::warn!("Service API key not configured - referral linking is disabled");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("Admin API key not configured - admin endpoints are disabled");
        }

        let ledger = Ledger::new(store, oracle, catalog, config.ledger.clone());

        Self {
            ledger: Arc::new(ledger),
            config,
        }
    }
}
