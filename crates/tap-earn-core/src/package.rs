//! Package tiers and the package catalog.
//!
//! A package overrides an account's tap value and bounds the total it can earn
//! from taps while the package is active. Packages are paid for outside the
//! ledger (in TON); the ledger only records the opaque payment proof.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AccountId, PackageId, TransactionId};
use crate::transaction::LedgerTransaction;

/// A purchasable earning tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Catalog id.
    pub id: PackageId,

    /// Display name.
    pub name: String,

    /// Price in US dollars.
    pub price: Decimal,

    /// Points credited per tap while the package is active.
    pub tap_value: Decimal,

    /// Maximum points earned under this package. Zero or negative means no cap.
    pub max_earnings: Decimal,

    /// Whether taps stop consuming energy.
    #[serde(default)]
    pub unlimited_taps: bool,
}

impl Package {
    /// Whether tap earnings under this package are capped.
    #[must_use]
    pub fn is_capped(&self) -> bool {
        self.max_earnings > Decimal::ZERO
    }

    /// Price converted to TON at the given TON/USD quote.
    ///
    /// Returns `None` when the quote is not positive.
    #[must_use]
    pub fn price_in_ton(&self, ton_usd: Decimal) -> Option<Decimal> {
        if ton_usd <= Decimal::ZERO {
            return None;
        }
        Some((self.price / ton_usd).round_dp(9))
    }
}

/// The catalog of packages on sale, ordered by price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageCatalog {
    packages: Vec<Package>,
}

impl PackageCatalog {
    /// Build a catalog, validating every tier.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidRequest` on duplicate ids, a non-positive
    /// tap value or a negative price.
    pub fn new(mut packages: Vec<Package>) -> Result<Self> {
        packages.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));

        for (index, package) in packages.iter().enumerate() {
            if package.tap_value <= Decimal::ZERO {
                return Err(LedgerError::InvalidRequest(format!(
                    "package {} has a non-positive tap value",
                    package.id
                )));
            }
            if package.price < Decimal::ZERO {
                return Err(LedgerError::InvalidRequest(format!(
                    "package {} has a negative price",
                    package.id
                )));
            }
            if packages[..index].iter().any(|p| p.id == package.id) {
                return Err(LedgerError::InvalidRequest(format!(
                    "duplicate package id {}",
                    package.id
                )));
            }
        }

        Ok(Self { packages })
    }

    /// Parse a catalog from a JSON array of packages.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidRequest` if the JSON is malformed or a tier
    /// is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let packages: Vec<Package> = serde_json::from_str(json)
            .map_err(|e| LedgerError::InvalidRequest(format!("invalid package catalog: {e}")))?;
        Self::new(packages)
    }

    /// Look up a package by id.
    #[must_use]
    pub fn get(&self, id: &PackageId) -> Option<&Package> {
        self.packages.iter().find(|p| &p.id == id)
    }

    /// Look up a package, failing with `UnknownPackage`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownPackage` if the id is not in the catalog.
    pub fn require(&self, id: &PackageId) -> Result<&Package> {
        self.get(id).ok_or_else(|| LedgerError::unknown_package(id))
    }

    /// Iterate over the packages, cheapest first.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    /// Number of packages on sale.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl Default for PackageCatalog {
    fn default() -> Self {
        let tier = |id: &'static str, name: &str, price: i64, tap_value: Decimal, max_earnings: i64| {
            Package {
                id: PackageId::from_static(id),
                name: name.to_string(),
                price: Decimal::from(price),
                tap_value,
                max_earnings: Decimal::from(max_earnings),
                unlimited_taps: false,
            }
        };

        let mut unlimited = tier("unlimited", "Unlimited", 500, Decimal::ONE, -1);
        unlimited.unlimited_taps = true;

        Self {
            packages: vec![
                tier("starter", "Starter", 5, Decimal::new(2, 1), 10_000),
                tier("bronze", "Bronze", 10, Decimal::new(25, 2), 20_000),
                tier("silver", "Silver", 50, Decimal::new(5, 1), 100_000),
                tier("gold", "Gold", 100, Decimal::ONE, 200_000),
                unlimited,
                tier("diamond", "Diamond", 1000, Decimal::TEN, 2_000_000),
            ],
        }
    }
}

/// Record of a package purchase, keyed by its payment proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagePurchase {
    /// Opaque payment confirmation (e.g. an on-chain transaction hash).
    pub payment_proof: String,

    /// The buyer.
    pub account_id: AccountId,

    /// The package bought.
    pub package_id: PackageId,

    /// Price paid in US dollars.
    pub price: Decimal,

    /// The `package_purchase` transaction written on activation.
    pub transaction_id: TransactionId,

    /// When the purchase was recorded.
    pub created_at: DateTime<Utc>,
}

impl PackagePurchase {
    /// Record a purchase from its activation transaction.
    #[must_use]
    pub fn new(package: &Package, payment_proof: &str, transaction: &LedgerTransaction) -> Self {
        Self {
            payment_proof: payment_proof.to_string(),
            account_id: transaction.account_id,
            package_id: package.id.clone(),
            price: package.price,
            transaction_id: transaction.id,
            created_at: transaction.created_at,
        }
    }
}
