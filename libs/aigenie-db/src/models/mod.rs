pub mod account;
pub mod order;
pub mod referral;
pub mod subscription;
pub mod transaction;

pub use account::{Account, Product};
pub use order::Order;
pub use referral::{BonusAmounts, Referral};
pub use subscription::{DailyQuota, Subscription, SubscriptionCategory};
pub use transaction::{BalanceChange, LedgerEntry, TxOutcome};
