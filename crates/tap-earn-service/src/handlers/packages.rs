//! Package catalog and purchase handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tap_earn_core::{Package, PackageId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{AccountView, PackageQuote};
use crate::state::AppState;

/// Package list response.
#[derive(Debug, Serialize)]
pub struct ListPackagesResponse {
    /// Packages on sale, cheapest first.
    pub packages: Vec<PackageQuote>,
}

/// List the package catalog with TON prices.
pub async fn list_packages(State(state): State<Arc<AppState>>) -> Json<ListPackagesResponse> {
    Json(ListPackagesResponse {
        packages: state.ledger.list_packages().await,
    })
}

/// Purchase request.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// Catalog id of the package.
    pub package_id: PackageId,
    /// Opaque payment confirmation (e.g. an on-chain transaction hash).
    pub payment_proof: String,
}

/// Purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// The account after activation.
    pub account: AccountView,
    /// The package bought.
    pub package: Package,
    /// The `package_purchase` transaction.
    pub transaction_id: String,
    /// Whether the payment proof had already been applied.
    pub replayed: bool,
}

/// Activate a package for the caller.
pub async fn purchase_package(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let result = state
        .ledger
        .purchase_package(auth.account_id, &body.package_id, &body.payment_proof)
        .await?;

    let quote = state.ledger.price_quote().await;
    Ok(Json(PurchaseResponse {
        account: AccountView::new(
            &result.account,
            state.ledger.config(),
            quote.ton_usd,
            chrono::Utc::now(),
        ),
        package: result.package,
        transaction_id: result.transaction_id.to_string(),
        replayed: result.replayed,
    }))
}
