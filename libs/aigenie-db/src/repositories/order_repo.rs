use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Order;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, invoice_id: i64, account_id: i64, item_code: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (invoice_id, account_id, item_code) VALUES ($1, $2, $3)",
        )
        .bind(invoice_id)
        .bind(account_id)
        .bind(item_code)
        .execute(&self.pool)
        .await
        .context("Failed to create order")?;
        Ok(())
    }

    /// Orders are kept after reconciliation: replay safety comes from the
    /// transactions idempotency key, and a retained row lets a replayed
    /// webhook still resolve the invoice instead of failing validation.
    pub async fn get(&self, invoice_id: i64) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order")
    }
}
