use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::transaction::STATUS_APPLIED;
use crate::models::{Subscription, SubscriptionCategory};

/// Outcome of a payment-backed plan activation.
#[derive(Debug, Clone)]
pub enum PlanActivation {
    Activated(Subscription),
    Duplicate,
}

/// Time-boxed subscriptions with a per-day usage quota. Expiry is a read-time
/// predicate (`end_date > now()`); no background job mutates rows.
#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds the active subscription for the category, lazily resetting
    /// `usage_today` the first time it is touched on a new UTC calendar day.
    /// The reset is a guarded UPDATE, so concurrent readers apply it at most
    /// once and none of them can observe yesterday's usage on today's read.
    pub async fn find_active(
        &self,
        account_id: i64,
        category: SubscriptionCategory,
    ) -> Result<Option<Subscription>> {
        sqlx::query(
            "UPDATE subscriptions
             SET usage_today = 0, last_reset_date = now()
             WHERE account_id = $1 AND category = $2 AND end_date > now()
               AND (last_reset_date AT TIME ZONE 'UTC')::date < (now() AT TIME ZONE 'UTC')::date",
        )
        .bind(account_id)
        .bind(category.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to apply daily usage reset")?;

        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions
             WHERE account_id = $1 AND category = $2 AND end_date > now()
             ORDER BY end_date DESC
             LIMIT 1",
        )
        .bind(account_id)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch active subscription")
    }

    /// Replaces the active subscription of this category in place, or inserts
    /// a new row. Buying mid-term overwrites the old plan; remaining days and
    /// today's unused quota are forfeited rather than added on.
    ///
    /// The external payment id and the plan change commit as one atomic unit,
    /// so a replayed payment notification can never renew the plan twice.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_or_renew(
        &self,
        payment_id: &str,
        account_id: i64,
        category: SubscriptionCategory,
        plan: &str,
        daily_limit: i32,
        duration_days: i64,
        price: i32,
    ) -> Result<PlanActivation> {
        let mut tx = self.pool.begin().await.context("Failed to begin tx")?;

        let inserted = sqlx::query(
            "INSERT INTO transactions (payment_id, account_id, product, amount, status)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (payment_id) DO NOTHING",
        )
        .bind(payment_id)
        .bind(account_id)
        .bind(plan)
        .bind(price)
        .bind(STATUS_APPLIED)
        .execute(&mut *tx)
        .await
        .context("Failed to record plan payment")?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(PlanActivation::Duplicate);
        }

        let sub = Self::upsert_in_tx(&mut tx, account_id, category, plan, daily_limit, duration_days)
            .await?;
        tx.commit().await.context("Failed to commit plan activation")?;
        Ok(PlanActivation::Activated(sub))
    }

    async fn upsert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        account_id: i64,
        category: SubscriptionCategory,
        plan: &str,
        daily_limit: i32,
        duration_days: i64,
    ) -> Result<Subscription> {
        // Two racing activations with distinct payment ids would both miss
        // the UPDATE and both INSERT, leaving two active rows. Locking the
        // account row serializes them; the loser then sees the winner's row.
        sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .execute(&mut **tx)
            .await
            .context("Failed to lock account for plan activation")?;

        let renewed = sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions
             SET plan = $3, daily_limit = $4, start_date = now(),
                 end_date = now() + ($5 * interval '1 day'),
                 usage_today = 0, last_reset_date = now()
             WHERE account_id = $1 AND category = $2 AND end_date > now()
             RETURNING *",
        )
        .bind(account_id)
        .bind(category.as_str())
        .bind(plan)
        .bind(daily_limit)
        .bind(duration_days)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to renew subscription")?;

        if let Some(sub) = renewed {
            return Ok(sub);
        }

        sqlx::query_as::<_, Subscription>(
            "INSERT INTO subscriptions
                 (account_id, category, plan, daily_limit, start_date, end_date,
                  usage_today, last_reset_date)
             VALUES ($1, $2, $3, $4, now(), now() + ($5 * interval '1 day'), 0, now())
             RETURNING *",
        )
        .bind(account_id)
        .bind(category.as_str())
        .bind(plan)
        .bind(daily_limit)
        .bind(duration_days)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to create subscription")
    }

    /// Increments today's usage on the active subscription. The guard repeats
    /// the headroom check so racing callers can never push `usage_today` past
    /// the limit even if both saw headroom on their earlier read.
    pub async fn increment_usage(
        &self,
        account_id: i64,
        category: SubscriptionCategory,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE subscriptions
             SET usage_today = usage_today + 1
             WHERE account_id = $1 AND category = $2 AND end_date > now()
               AND (daily_limit < 0 OR usage_today < daily_limit)",
        )
        .bind(account_id)
        .bind(category.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to increment subscription usage")?;

        Ok(updated.rows_affected() > 0)
    }

    /// All active subscriptions of an account (at most one per category).
    pub async fn list_active(&self, account_id: i64) -> Result<Vec<Subscription>> {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions
             WHERE account_id = $1 AND end_date > now()
             ORDER BY category",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active subscriptions")
    }
}
