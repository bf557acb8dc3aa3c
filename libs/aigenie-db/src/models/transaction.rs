use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status recorded on ledger rows. Only `applied` rows count toward the
/// at-most-one-per-payment-id invariant; the unique index enforces that no
/// second applied row can ever exist.
pub const STATUS_APPLIED: &str = "applied";

/// An immutable ledger entry. `payment_id` is NULL for internal adjustments
/// (generation debits, referral bonuses).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub payment_id: Option<String>,
    pub account_id: i64,
    pub product: String,
    pub amount: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of applying an externally-identified payment. `Duplicate` is a
/// success-equivalent no-op: the payment is already reflected in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Applied(i32),
    Duplicate,
}

/// Outcome of a balance adjustment. An insufficient debit leaves the balance
/// untouched; callers must handle it as an expected business outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Applied(i32),
    InsufficientBalance,
}
