//! `PostgreSQL` storage implementation.
//!
//! Every compound operation runs in one database transaction. Account rows are
//! locked with `SELECT ... FOR UPDATE` before the ledger rule runs, so
//! concurrent operations on one account serialize on the row lock. Two-account
//! operations lock in ascending id order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};

use tap_earn_core::{
    Account, AccountId, AccountProfile, LedgerConfig, LedgerError, LedgerTransaction, Package,
    PackageId, PackagePurchase, TapReceipt, TransactionId, TransactionType, WithdrawalDraft,
    WithdrawalId, WithdrawalOutcome, WithdrawalRequest, WithdrawalStatus,
};

use crate::error::{Result, StoreError};
use crate::schema::{ACCOUNT_COLUMNS, PURCHASE_COLUMNS, TRANSACTION_COLUMNS, WITHDRAWAL_COLUMNS};
use crate::{LedgerStats, PackageActivation, Store};

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row decoding
// =============================================================================

fn decode_err(e: impl ToString) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let active_package: Option<String> = row.try_get("active_package")?;
    let pending_withdrawal: Option<uuid::Uuid> = row.try_get("pending_withdrawal")?;
    let referrer_id: Option<i64> = row.try_get("referrer_id")?;

    Ok(Account {
        id: AccountId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        balance: row.try_get("balance")?,
        energy: row.try_get("energy")?,
        max_energy: row.try_get("max_energy")?,
        total_taps: row.try_get("total_taps")?,
        tap_value: row.try_get("tap_value")?,
        active_package: active_package
            .map(|id| id.parse::<PackageId>())
            .transpose()
            .map_err(decode_err)?,
        package_earnings: row.try_get("package_earnings")?,
        max_package_earnings: row.try_get("max_package_earnings")?,
        unlimited_taps: row.try_get("unlimited_taps")?,
        referrer_id: referrer_id.map(AccountId::new),
        referral_count: row.try_get("referral_count")?,
        withdrawal_cooldown_until: row.try_get("withdrawal_cooldown_until")?,
        pending_withdrawal: pending_withdrawal.map(WithdrawalId::from_uuid),
        last_energy_reset_at: row.try_get("last_energy_reset_at")?,
        created_at: row.try_get("created_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<LedgerTransaction> {
    let id: String = row.try_get("id")?;
    let transaction_type: String = row.try_get("transaction_type")?;

    Ok(LedgerTransaction {
        id: id.parse::<TransactionId>().map_err(decode_err)?,
        account_id: AccountId::new(row.try_get("account_id")?),
        transaction_type: TransactionType::parse(&transaction_type)
            .ok_or_else(|| decode_err(format!("unknown transaction type: {transaction_type}")))?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        description: row.try_get("description")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> Result<WithdrawalRequest> {
    let status: String = row.try_get("status")?;

    Ok(WithdrawalRequest {
        id: WithdrawalId::from_uuid(row.try_get("id")?),
        account_id: AccountId::new(row.try_get("account_id")?),
        amount: row.try_get("amount")?,
        required_balance: row.try_get("required_balance")?,
        destination_address: row.try_get("destination_address")?,
        status: WithdrawalStatus::parse(&status)
            .ok_or_else(|| decode_err(format!("unknown withdrawal status: {status}")))?,
        idempotency_key: row.try_get("idempotency_key")?,
        requested_at: row.try_get("requested_at")?,
        processed_at: row.try_get("processed_at")?,
        tx_hash: row.try_get("tx_hash")?,
        error_message: row.try_get("error_message")?,
    })
}

fn purchase_from_row(row: &PgRow) -> Result<PackagePurchase> {
    let package_id: String = row.try_get("package_id")?;
    let transaction_id: String = row.try_get("transaction_id")?;

    Ok(PackagePurchase {
        payment_proof: row.try_get("payment_proof")?,
        account_id: AccountId::new(row.try_get("account_id")?),
        package_id: package_id.parse().map_err(decode_err)?,
        price: row.try_get("price")?,
        transaction_id: transaction_id.parse().map_err(decode_err)?,
        created_at: row.try_get("created_at")?,
    })
}

fn limit_offset(limit: usize, offset: usize) -> (i64, i64) {
    (
        i64::try_from(limit).unwrap_or(i64::MAX),
        i64::try_from(offset).unwrap_or(i64::MAX),
    )
}

// =============================================================================
// Row writes (inside a transaction)
// =============================================================================

async fn lock_account(conn: &mut PgConnection, id: AccountId) -> Result<Option<Account>> {
    let row = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(account_from_row).transpose()
}

async fn lock_or_create_account(
    conn: &mut PgConnection,
    id: AccountId,
    config: &LedgerConfig,
    now: DateTime<Utc>,
) -> Result<Account> {
    let fresh = Account::new(id, config, now);
    let inserted = insert_account(conn, &fresh, false).await?;
    if inserted {
        tracing::info!(account_id = %id, "account created");
    }

    lock_account(conn, id)
        .await?
        .ok_or_else(|| StoreError::not_found("account", id))
}

/// Insert an account. With `overwrite` an existing row is replaced, otherwise
/// it is left alone. Returns whether a row was written.
async fn insert_account(conn: &mut PgConnection, account: &Account, overwrite: bool) -> Result<bool> {
    let on_conflict = if overwrite {
        "ON CONFLICT (id) DO UPDATE SET \
         username = EXCLUDED.username, first_name = EXCLUDED.first_name, \
         balance = EXCLUDED.balance, energy = EXCLUDED.energy, \
         max_energy = EXCLUDED.max_energy, total_taps = EXCLUDED.total_taps, \
         tap_value = EXCLUDED.tap_value, active_package = EXCLUDED.active_package, \
         package_earnings = EXCLUDED.package_earnings, \
         max_package_earnings = EXCLUDED.max_package_earnings, \
         unlimited_taps = EXCLUDED.unlimited_taps, referrer_id = EXCLUDED.referrer_id, \
         referral_count = EXCLUDED.referral_count, \
         withdrawal_cooldown_until = EXCLUDED.withdrawal_cooldown_until, \
         pending_withdrawal = EXCLUDED.pending_withdrawal, \
         last_energy_reset_at = EXCLUDED.last_energy_reset_at, \
         created_at = EXCLUDED.created_at, last_seen_at = EXCLUDED.last_seen_at, \
         updated_at = EXCLUDED.updated_at"
    } else {
        "ON CONFLICT (id) DO NOTHING"
    };

    let result = sqlx::query(&format!(
        "INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) \
         {on_conflict}"
    ))
    .bind(account.id.get())
    .bind(&account.username)
    .bind(&account.first_name)
    .bind(account.balance)
    .bind(account.energy)
    .bind(account.max_energy)
    .bind(account.total_taps)
    .bind(account.tap_value)
    .bind(account.active_package.as_ref().map(PackageId::as_str))
    .bind(account.package_earnings)
    .bind(account.max_package_earnings)
    .bind(account.unlimited_taps)
    .bind(account.referrer_id.map(AccountId::get))
    .bind(account.referral_count)
    .bind(account.withdrawal_cooldown_until)
    .bind(account.pending_withdrawal.map(|id| *id.as_uuid()))
    .bind(account.last_energy_reset_at)
    .bind(account.created_at)
    .bind(account.last_seen_at)
    .bind(account.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn save_account(conn: &mut PgConnection, account: &Account) -> Result<()> {
    insert_account(conn, account, true).await.map(|_| ())
}

async fn insert_transaction(conn: &mut PgConnection, tx: &LedgerTransaction) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO ledger_transactions ({TRANSACTION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(tx.id.to_string())
    .bind(tx.account_id.get())
    .bind(tx.transaction_type.as_str())
    .bind(tx.amount)
    .bind(tx.balance_after)
    .bind(&tx.description)
    .bind(&tx.metadata)
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_withdrawal(conn: &mut PgConnection, request: &WithdrawalRequest) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO withdrawals ({WITHDRAWAL_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(*request.id.as_uuid())
    .bind(request.account_id.get())
    .bind(request.amount)
    .bind(request.required_balance)
    .bind(&request.destination_address)
    .bind(request.status.as_str())
    .bind(&request.idempotency_key)
    .bind(request.requested_at)
    .bind(request.processed_at)
    .bind(&request.tx_hash)
    .bind(&request.error_message)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn find_by_key(
    conn: &mut PgConnection,
    account_id: AccountId,
    idempotency_key: &str,
) -> Result<Option<WithdrawalRequest>> {
    let row = sqlx::query(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals \
         WHERE account_id = $1 AND idempotency_key = $2"
    ))
    .bind(account_id.get())
    .bind(idempotency_key)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(withdrawal_from_row).transpose()
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn get_or_create_account(
        &self,
        id: AccountId,
        profile: Option<&AccountProfile>,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        let mut tx = self.pool.begin().await?;
        let mut account = lock_or_create_account(&mut tx, id, config, now).await?;

        account.touch(profile, now);
        account.apply_energy_reset_if_due(now);
        save_account(&mut tx, &account).await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn put_account(&self, account: &Account) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        save_account(&mut conn, account).await
    }

    async fn list_referrals(&self, id: AccountId) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE referrer_id = $1 ORDER BY created_at"
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    async fn list_transactions_by_account(
        &self,
        id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let (limit, offset) = limit_offset(limit, offset);
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(id.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    // =========================================================================
    // Withdrawal Operations
    // =========================================================================

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn find_withdrawal_by_key(
        &self,
        account_id: AccountId,
        idempotency_key: &str,
    ) -> Result<Option<WithdrawalRequest>> {
        let mut conn = self.pool.acquire().await?;
        find_by_key(&mut conn, account_id, idempotency_key).await
    }

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        let (limit, offset) = limit_offset(limit, offset);
        let rows = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY requested_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(withdrawal_from_row).collect()
    }

    async fn list_account_withdrawals(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        let (limit, offset) = limit_offset(limit, offset);
        let rows = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE account_id = $1 \
             ORDER BY requested_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(account_id.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(withdrawal_from_row).collect()
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn tap(
        &self,
        id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<TapReceipt> {
        let mut tx = self.pool.begin().await?;
        let mut account = lock_or_create_account(&mut tx, id, config, now).await?;

        let transaction = account.tap(now)?;
        save_account(&mut tx, &account).await?;
        insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;
        Ok(TapReceipt {
            account,
            transaction,
        })
    }

    async fn activate_package(
        &self,
        id: AccountId,
        package: &Package,
        payment_proof: &str,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<PackageActivation> {
        if payment_proof.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("payment proof is required".into()).into());
        }

        let mut tx = self.pool.begin().await?;
        let mut account = lock_or_create_account(&mut tx, id, config, now).await?;

        let existing = sqlx::query(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM package_purchases WHERE payment_proof = $1"
        ))
        .bind(payment_proof)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            let purchase = purchase_from_row(&row)?;
            if purchase.account_id != id {
                return Err(LedgerError::PaymentProofReused.into());
            }
            tx.commit().await?;
            return Ok(PackageActivation {
                account,
                purchase,
                replayed: true,
            });
        }

        let transaction = account.activate_package(package, payment_proof, now);
        let purchase = PackagePurchase::new(package, payment_proof, &transaction);

        save_account(&mut tx, &account).await?;
        insert_transaction(&mut tx, &transaction).await?;
        sqlx::query(&format!(
            "INSERT INTO package_purchases ({PURCHASE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&purchase.payment_proof)
        .bind(purchase.account_id.get())
        .bind(purchase.package_id.as_str())
        .bind(purchase.price)
        .bind(purchase.transaction_id.to_string())
        .bind(purchase.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PackageActivation {
            account,
            purchase,
            replayed: false,
        })
    }

    async fn link_referral(
        &self,
        new_id: AccountId,
        referrer_id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if new_id == referrer_id {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        // Lock in ascending id order.
        let (mut new_account, referrer) = if new_id < referrer_id {
            let new_account = lock_or_create_account(&mut tx, new_id, config, now).await?;
            (new_account, lock_account(&mut tx, referrer_id).await?)
        } else {
            let referrer = lock_account(&mut tx, referrer_id).await?;
            if referrer.is_none() {
                return Ok(false);
            }
            (lock_or_create_account(&mut tx, new_id, config, now).await?, referrer)
        };

        let Some(mut referrer) = referrer else {
            return Ok(false);
        };
        if !new_account.accept_referrer(referrer_id, now) {
            return Ok(false);
        }
        let transaction = referrer.credit_referral_bonus(new_id, config.referral_bonus, now);

        save_account(&mut tx, &new_account).await?;
        save_account(&mut tx, &referrer).await?;
        insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_withdrawal(
        &self,
        account_id: AccountId,
        draft: WithdrawalDraft,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest> {
        let mut tx = self.pool.begin().await?;
        let mut account = lock_account(&mut tx, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound { account_id })?;

        if let Some(key) = draft.idempotency_key.as_deref() {
            if let Some(existing) = find_by_key(&mut tx, account_id, key).await? {
                return Ok(existing);
            }
        }

        let (request, transaction) =
            account.reserve_withdrawal(draft, config.withdrawal_cooldown(), now)?;

        save_account(&mut tx, &account).await?;
        insert_withdrawal(&mut tx, &request).await?;
        insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;
        Ok(request)
    }

    async fn settle_withdrawal(
        &self,
        id: WithdrawalId,
        outcome: WithdrawalOutcome,
        tx_hash: Option<String>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest> {
        let mut tx = self.pool.begin().await?;

        let account_id: i64 = sqlx::query("SELECT account_id FROM withdrawals WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::WithdrawalNotFound { withdrawal_id: id })?
            .try_get("account_id")?;
        let account_id = AccountId::new(account_id);

        // Account row first, then the request row.
        let mut account = lock_account(&mut tx, account_id)
            .await?
            .ok_or_else(|| StoreError::not_found("account", account_id))?;
        let row = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1 FOR UPDATE"
        ))
        .bind(*id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let mut request = withdrawal_from_row(&row)?;

        request.settle(outcome, tx_hash, error_message, now)?;
        let refund = account.release_withdrawal(&request, outcome, now);

        sqlx::query(
            "UPDATE withdrawals SET status = $2, processed_at = $3, tx_hash = $4, \
             error_message = $5 WHERE id = $1",
        )
        .bind(*request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.processed_at)
        .bind(&request.tx_hash)
        .bind(&request.error_message)
        .execute(&mut *tx)
        .await?;
        save_account(&mut tx, &account).await?;
        if let Some(refund) = &refund {
            insert_transaction(&mut tx, refund).await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    async fn stats(&self, now: DateTime<Utc>) -> Result<LedgerStats> {
        let row = sqlx::query(
            "SELECT \
                 COUNT(*) AS total_accounts, \
                 COUNT(*) FILTER (WHERE created_at >= $1) AS new_accounts, \
                 COALESCE(SUM(balance), 0) AS total_balance, \
                 COALESCE(SUM(total_taps), 0)::BIGINT AS total_taps, \
                 (SELECT COUNT(*) FROM withdrawals WHERE status = 'pending') AS pending \
             FROM accounts",
        )
        .bind(now - Duration::hours(24))
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerStats {
            total_accounts: row.try_get("total_accounts")?,
            new_accounts_24h: row.try_get("new_accounts")?,
            total_balance: row.try_get::<Decimal, _>("total_balance")?,
            total_taps: row.try_get("total_taps")?,
            pending_withdrawals: row.try_get("pending")?,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
