use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::models::transaction::STATUS_APPLIED;
use crate::models::{Account, BalanceChange, LedgerEntry, Product, TxOutcome};

/// Authoritative store of per-account, per-product balances plus the
/// append-only transaction history. Every mutation is a single atomic SQL
/// unit scoped to one account row; no cross-account locking exists.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the account with starter balances on first contact, recording
    /// the referrer only when the row is actually inserted. Returns the
    /// account and whether it was newly created.
    pub async fn ensure_account(
        &self,
        account_id: i64,
        referrer_id: Option<i64>,
    ) -> Result<(Account, bool)> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO accounts (id, referrer_id) VALUES ($1, $2)
             ON CONFLICT (id) DO NOTHING
             RETURNING id",
        )
        .bind(account_id)
        .bind(referrer_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to upsert account")?;

        let account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Account {} missing after upsert", account_id))?;

        Ok((account, inserted.is_some()))
    }

    pub async fn get_account(&self, account_id: i64) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")
    }

    pub async fn get_balance(&self, account_id: i64, product: Product) -> Result<i32> {
        let sql = format!(
            "SELECT {col} FROM accounts WHERE id = $1",
            col = product.code()
        );
        let balance: Option<i32> = sqlx::query_scalar(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch balance")?;
        Ok(balance.unwrap_or(0))
    }

    /// Atomically applies `delta` to one product balance. A debit that would
    /// go negative is refused in the WHERE clause, so no partial debit and no
    /// read-modify-write race is possible. Applied adjustments append a
    /// ledger row (NULL payment_id) in the same DB transaction.
    pub async fn adjust_balance(
        &self,
        account_id: i64,
        product: Product,
        delta: i32,
    ) -> Result<BalanceChange> {
        let mut tx = self.pool.begin().await.context("Failed to begin tx")?;

        let sql = format!(
            "UPDATE accounts SET {col} = {col} + $1
             WHERE id = $2 AND {col} + $1 >= 0
             RETURNING {col}",
            col = product.code()
        );
        let new_balance: Option<i32> = sqlx::query_scalar(&sql)
            .bind(delta)
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to adjust balance")?;

        let Some(new_balance) = new_balance else {
            tx.rollback().await.ok();
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to check account existence")?;
            if exists.is_some() && delta < 0 {
                return Ok(BalanceChange::InsufficientBalance);
            }
            return Err(anyhow::anyhow!("Account {} not found", account_id));
        };

        sqlx::query(
            "INSERT INTO transactions (payment_id, account_id, product, amount, status)
             VALUES (NULL, $1, $2, $3, $4)",
        )
        .bind(account_id)
        .bind(product.code())
        .bind(delta)
        .bind(STATUS_APPLIED)
        .execute(&mut *tx)
        .await
        .context("Failed to append ledger entry")?;

        tx.commit().await.context("Failed to commit adjustment")?;
        Ok(BalanceChange::Applied(new_balance))
    }

    /// Applies an externally-identified credit exactly once. The transaction
    /// insert and the balance update share one DB transaction; concurrent
    /// deliveries of the same payment serialize on the unique payment_id
    /// index and the loser sees `Duplicate` without touching the balance.
    pub async fn apply_transaction(
        &self,
        payment_id: &str,
        account_id: i64,
        product: Product,
        amount: i32,
    ) -> Result<TxOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin tx")?;

        let inserted = sqlx::query(
            "INSERT INTO transactions (payment_id, account_id, product, amount, status)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (payment_id) DO NOTHING",
        )
        .bind(payment_id)
        .bind(account_id)
        .bind(product.code())
        .bind(amount)
        .bind(STATUS_APPLIED)
        .execute(&mut *tx)
        .await
        .context("Failed to insert transaction")?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.ok();
            info!(payment_id, account_id, "duplicate payment ignored");
            return Ok(TxOutcome::Duplicate);
        }

        let sql = format!(
            "UPDATE accounts SET {col} = {col} + $1
             WHERE id = $2 AND {col} + $1 >= 0
             RETURNING {col}",
            col = product.code()
        );
        let new_balance: i32 = sqlx::query_scalar(&sql)
            .bind(amount)
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to credit balance")?
            .ok_or_else(|| anyhow::anyhow!("Account {} not found for credit", account_id))?;

        tx.commit().await.context("Failed to commit credit")?;
        info!(
            payment_id,
            account_id,
            product = product.code(),
            amount,
            "payment applied"
        );
        Ok(TxOutcome::Applied(new_balance))
    }

    pub async fn history(&self, account_id: i64, limit: i64) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM transactions WHERE account_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch ledger history")
    }
}
