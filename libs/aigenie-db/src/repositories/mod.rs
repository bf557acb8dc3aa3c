pub mod ledger_repo;
pub mod order_repo;
pub mod referral_repo;
pub mod subscription_repo;

pub use ledger_repo::LedgerRepository;
pub use order_repo::OrderRepository;
pub use referral_repo::ReferralRepository;
pub use subscription_repo::{PlanActivation, SubscriptionRepository};
