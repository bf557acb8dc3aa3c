use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::models::transaction::STATUS_APPLIED;
use crate::models::{BonusAmounts, Referral};

#[derive(Debug, Clone)]
pub struct ReferralRepository {
    pool: PgPool,
}

impl ReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records the referral relationship. Returns false when the referred
    /// account already has a referrer (the UNIQUE index on referred_id makes
    /// re-referral a silent no-op). Self-referral is additionally rejected by
    /// the table CHECK constraint.
    pub async fn register(&self, referrer_id: i64, referred_id: i64) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO referrals (referrer_id, referred_id)
             VALUES ($1, $2)
             ON CONFLICT (referred_id) DO NOTHING",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .execute(&self.pool)
        .await
        .context("Failed to register referral")?;

        Ok(inserted.rows_affected() > 0)
    }

    /// Grants the referral bonus exactly once per (referrer, referred) pair.
    /// The guarded UPDATE claims the grant; the balance credits and their
    /// ledger rows ride in the same DB transaction, so a crash can never
    /// leave the bonus paid but unflagged or flagged but unpaid.
    pub async fn grant_bonus_once(
        &self,
        referrer_id: i64,
        referred_id: i64,
        amounts: &BonusAmounts,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin tx")?;

        let claimed = sqlx::query(
            "UPDATE referrals SET bonus_given = TRUE
             WHERE referrer_id = $1 AND referred_id = $2 AND bonus_given = FALSE",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim referral bonus")?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        sqlx::query(
            "UPDATE accounts
             SET chatgpt = chatgpt + $1,
                 dalle = dalle + $2,
                 stable = stable + $3,
                 midjourney = midjourney + $4
             WHERE id = $5",
        )
        .bind(amounts.chatgpt)
        .bind(amounts.dalle)
        .bind(amounts.stable)
        .bind(amounts.midjourney)
        .bind(referrer_id)
        .execute(&mut *tx)
        .await
        .context("Failed to credit referral bonus")?;

        for (product, amount) in amounts.per_product() {
            sqlx::query(
                "INSERT INTO transactions (payment_id, account_id, product, amount, status)
                 VALUES (NULL, $1, $2, $3, $4)",
            )
            .bind(referrer_id)
            .bind(product.code())
            .bind(amount)
            .bind(STATUS_APPLIED)
            .execute(&mut *tx)
            .await
            .context("Failed to append bonus ledger entry")?;
        }

        tx.commit().await.context("Failed to commit referral bonus")?;
        info!(referrer_id, referred_id, "referral bonus granted");
        Ok(true)
    }

    pub async fn list_for(&self, referrer_id: i64) -> Result<Vec<Referral>> {
        sqlx::query_as::<_, Referral>(
            "SELECT * FROM referrals WHERE referrer_id = $1 ORDER BY joined_at DESC",
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list referrals")
    }

    pub async fn count_for(&self, referrer_id: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM referrals WHERE referrer_id = $1")
            .bind(referrer_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count referrals")?;
        Ok(count.0)
    }
}
