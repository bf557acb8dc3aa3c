use chrono::{DateTime, Utc};
use serde::Serialize;

/// A pending crypto-rail invoice. The webhook only carries `invoice_id`, so
/// the purchased item is stashed here when the invoice is created.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub invoice_id: i64,
    pub account_id: i64,
    pub item_code: String,
    pub created_at: DateTime<Utc>,
}
