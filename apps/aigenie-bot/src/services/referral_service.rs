use aigenie_db::models::BonusAmounts;
use aigenie_db::repositories::{LedgerRepository, ReferralRepository};
use aigenie_db::PgPool;
use anyhow::Result;
use tracing::{info, warn};

use crate::services::pay_service::BalanceCache;

/// What the /start deep link resolved to. Every non-credited outcome is
/// silent: onboarding proceeds normally over a bad or repeated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    Credited { referrer_id: i64 },
    SelfReferral,
    UnknownReferrer,
    AlreadyReferred,
    NoReferrer,
}

/// Parses the payload of a `/start ref<id>` deep link.
pub fn parse_start_param(param: &str) -> Option<i64> {
    let id: i64 = param.strip_prefix("ref")?.parse().ok()?;
    (id > 0).then_some(id)
}

/// Drops a link that points back at the new account itself. The existence
/// check needs the ledger and lives in [`ReferralService::vet_referrer`].
pub fn vet_link(referred_id: i64, referrer_id: Option<i64>) -> Option<i64> {
    referrer_id.filter(|&r| r != referred_id)
}

#[derive(Clone)]
pub struct ReferralService {
    referrals: ReferralRepository,
    ledger: LedgerRepository,
    bonus: BonusAmounts,
    balance_cache: BalanceCache,
}

impl ReferralService {
    pub fn new(pool: PgPool, balance_cache: BalanceCache) -> Self {
        Self {
            referrals: ReferralRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool),
            bonus: BonusAmounts::default(),
            balance_cache,
        }
    }

    /// Validates a deep-link referrer before anything is persisted: self
    /// links and ids with no account behind them resolve to `None`, so they
    /// never end up recorded on the new account row.
    pub async fn vet_referrer(
        &self,
        referred_id: i64,
        referrer_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let Some(referrer_id) = vet_link(referred_id, referrer_id) else {
            return Ok(None);
        };
        if self.ledger.get_account(referrer_id).await?.is_none() {
            warn!(referred_id, referrer_id, "referral link points to unknown account");
            return Ok(None);
        }
        Ok(Some(referrer_id))
    }

    /// Binds a newly registered account to its referrer and pays the bonus.
    /// Each referred account binds at most once, and the bonus is granted at
    /// most once even if two /start updates race.
    pub async fn attribute(
        &self,
        referred_id: i64,
        referrer_id: Option<i64>,
    ) -> Result<ReferralOutcome> {
        let Some(referrer_id) = referrer_id else {
            return Ok(ReferralOutcome::NoReferrer);
        };
        if referrer_id == referred_id {
            warn!(referred_id, "self-referral link ignored");
            return Ok(ReferralOutcome::SelfReferral);
        }
        // The referrer must be a real account; a fabricated deep link is not.
        if self.ledger.get_account(referrer_id).await?.is_none() {
            warn!(referred_id, referrer_id, "referral link points to unknown account");
            return Ok(ReferralOutcome::UnknownReferrer);
        }

        if !self.referrals.register(referrer_id, referred_id).await? {
            return Ok(ReferralOutcome::AlreadyReferred);
        }

        if self
            .referrals
            .grant_bonus_once(referrer_id, referred_id, &self.bonus)
            .await?
        {
            // The referrer's profile must not keep serving pre-bonus numbers.
            self.balance_cache.invalidate(referrer_id);
            info!(referrer_id, referred_id, "referral bonus credited");
            Ok(ReferralOutcome::Credited { referrer_id })
        } else {
            Ok(ReferralOutcome::AlreadyReferred)
        }
    }

    pub async fn count_for(&self, referrer_id: i64) -> Result<i64> {
        self.referrals.count_for(referrer_id).await
    }

    pub async fn list_for(&self, referrer_id: i64) -> Result<Vec<aigenie_db::models::Referral>> {
        self.referrals.list_for(referrer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_param_parsing() {
        assert_eq!(parse_start_param("ref12345"), Some(12345));
        assert_eq!(parse_start_param("ref0"), None);
        assert_eq!(parse_start_param("ref-5"), None);
        assert_eq!(parse_start_param("refabc"), None);
        assert_eq!(parse_start_param("12345"), None);
        assert_eq!(parse_start_param(""), None);
    }

    #[test]
    fn self_links_are_vetted_out_before_persistence() {
        assert_eq!(vet_link(42, Some(42)), None);
        assert_eq!(vet_link(42, Some(7)), Some(7));
        assert_eq!(vet_link(42, None), None);
    }
}
