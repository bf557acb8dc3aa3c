use aigenie_db::models::{BalanceChange, Product, Subscription, SubscriptionCategory};
use aigenie_db::repositories::{LedgerRepository, SubscriptionRepository};
use aigenie_db::PgPool;
use anyhow::Result;
use tracing::warn;

/// Which pool a generation will be charged against. Subscriptions always win
/// over the pay-as-you-go balance so credits are kept for after expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeVia {
    Subscription(SubscriptionCategory),
    Balance(Product),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    QuotaExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    Allowed(ConsumeVia),
    Denied(DenyReason),
}

/// Pure admission rule, separated from I/O so it can be tested exhaustively.
pub fn decide(subscription: Option<&Subscription>, balance: i32, product: Product) -> AccessVerdict {
    if let Some(sub) = subscription {
        if sub.has_headroom() {
            return AccessVerdict::Allowed(ConsumeVia::Subscription(product.category()));
        }
    }
    if balance > 0 {
        return AccessVerdict::Allowed(ConsumeVia::Balance(product));
    }
    AccessVerdict::Denied(DenyReason::QuotaExhausted)
}

/// Gatekeeper for every generation request: checks entitlement before the
/// expensive provider call, commits the consumption only after it succeeds.
#[derive(Clone)]
pub struct EntitlementService {
    ledger: LedgerRepository,
    subscriptions: SubscriptionRepository,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: LedgerRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool),
        }
    }

    /// Read-only admission check. The verdict can go stale between check and
    /// commit; `commit` re-validates, so this never over-admits, only
    /// occasionally sends a user to a generation that fails to settle.
    pub async fn check(&self, account_id: i64, product: Product) -> Result<AccessVerdict> {
        let sub = self
            .subscriptions
            .find_active(account_id, product.category())
            .await?;
        let balance = self.ledger.get_balance(account_id, product).await?;
        Ok(decide(sub.as_ref(), balance, product))
    }

    /// Settles one successful generation: a guarded usage increment for
    /// subscription traffic, a conditional debit for balance traffic. Both
    /// refuse to go past the limit even under racing commits; on refusal we
    /// fall through to the other pool before giving up.
    pub async fn commit(&self, account_id: i64, product: Product, via: ConsumeVia) -> Result<()> {
        match via {
            ConsumeVia::Subscription(category) => {
                if self.subscriptions.increment_usage(account_id, category).await? {
                    return Ok(());
                }
                // Plan expired or hit its limit between check and commit.
                warn!(account_id, product = product.code(), "usage commit fell back to balance");
                self.debit_one(account_id, product).await
            }
            ConsumeVia::Balance(product) => self.debit_one(account_id, product).await,
        }
    }

    async fn debit_one(&self, account_id: i64, product: Product) -> Result<()> {
        match self.ledger.adjust_balance(account_id, product, -1).await? {
            BalanceChange::Applied(_) => Ok(()),
            BalanceChange::InsufficientBalance => {
                // The generation already ran; the account simply ends at zero
                // entitlement. Log it rather than claw anything back.
                warn!(account_id, product = product.code(), "consumption commit found no balance");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigenie_db::models::SubscriptionCategory;
    use chrono::{Duration, Utc};

    fn sub(daily_limit: i32, usage_today: i32, days_left: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 1,
            account_id: 42,
            category: SubscriptionCategory::Chat.as_str().to_string(),
            plan: "chat_starter".to_string(),
            daily_limit,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(days_left),
            usage_today,
            last_reset_date: now,
        }
    }

    #[test]
    fn subscription_headroom_wins_over_balance() {
        let s = sub(20, 5, 3);
        let via_plan = AccessVerdict::Allowed(ConsumeVia::Subscription(SubscriptionCategory::Chat));
        assert_eq!(decide(Some(&s), 100, Product::ChatGpt), via_plan);
        // Even with zero balance the plan carries the request.
        assert_eq!(decide(Some(&s), 0, Product::ChatGpt), via_plan);
    }

    #[test]
    fn exhausted_plan_falls_back_to_balance() {
        let s = sub(20, 20, 3);
        assert_eq!(
            decide(Some(&s), 7, Product::ChatGpt),
            AccessVerdict::Allowed(ConsumeVia::Balance(Product::ChatGpt))
        );
        assert_eq!(
            decide(Some(&s), 0, Product::ChatGpt),
            AccessVerdict::Denied(DenyReason::QuotaExhausted)
        );
    }

    #[test]
    fn unlimited_plan_never_exhausts() {
        let s = sub(-1, 9999, 3);
        assert_eq!(
            decide(Some(&s), 0, Product::ChatGpt),
            AccessVerdict::Allowed(ConsumeVia::Subscription(SubscriptionCategory::Chat))
        );
    }

    #[test]
    fn no_subscription_uses_balance_only() {
        assert_eq!(
            decide(None, 3, Product::DallE),
            AccessVerdict::Allowed(ConsumeVia::Balance(Product::DallE))
        );
        assert_eq!(
            decide(None, 0, Product::DallE),
            AccessVerdict::Denied(DenyReason::QuotaExhausted)
        );
        // Negative balances never admit.
        assert_eq!(
            decide(None, -1, Product::DallE),
            AccessVerdict::Denied(DenyReason::QuotaExhausted)
        );
    }
}
