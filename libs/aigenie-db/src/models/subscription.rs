use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// Sentinel stored in `subscriptions.daily_limit` for unlimited plans.
pub const UNLIMITED_SENTINEL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionCategory {
    Chat,
    Image,
}

impl SubscriptionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionCategory::Chat => "chat",
            SubscriptionCategory::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, PayloadError> {
        match s {
            "chat" => Ok(SubscriptionCategory::Chat),
            "image" => Ok(SubscriptionCategory::Image),
            other => Err(PayloadError::UnknownItem(other.to_string())),
        }
    }
}

/// Daily consumption ceiling of a plan, decoded from the `-1` sentinel at the
/// model boundary so services never compare against raw column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyQuota {
    Unlimited,
    Limited(i32),
}

impl DailyQuota {
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            DailyQuota::Unlimited
        } else {
            DailyQuota::Limited(raw)
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            DailyQuota::Unlimited => UNLIMITED_SENTINEL,
            DailyQuota::Limited(n) => n,
        }
    }

    pub fn has_headroom(self, usage_today: i32) -> bool {
        match self {
            DailyQuota::Unlimited => true,
            DailyQuota::Limited(limit) => usage_today < limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub account_id: i64,
    pub category: String,
    pub plan: String,
    pub daily_limit: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub usage_today: i32,
    pub last_reset_date: DateTime<Utc>,
}

impl Subscription {
    pub fn quota(&self) -> DailyQuota {
        DailyQuota::from_raw(self.daily_limit)
    }

    pub fn has_headroom(&self) -> bool {
        self.quota().has_headroom(self.usage_today)
    }

    /// Whether `usage_today` is stale, i.e. last reset on an earlier UTC
    /// calendar day. The repository applies the same predicate in SQL when it
    /// serves reads; this form is for code that already holds a row.
    pub fn needs_daily_reset(&self, now: DateTime<Utc>) -> bool {
        self.last_reset_date.date_naive() < now.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_sentinel_decodes_to_unlimited() {
        assert_eq!(DailyQuota::from_raw(-1), DailyQuota::Unlimited);
        assert_eq!(DailyQuota::from_raw(20), DailyQuota::Limited(20));
        assert_eq!(DailyQuota::Unlimited.to_raw(), UNLIMITED_SENTINEL);
    }

    #[test]
    fn limited_quota_headroom() {
        let q = DailyQuota::Limited(5);
        assert!(q.has_headroom(0));
        assert!(q.has_headroom(4));
        assert!(!q.has_headroom(5));
        assert!(!q.has_headroom(6));
    }

    #[test]
    fn unlimited_quota_always_has_headroom() {
        assert!(DailyQuota::Unlimited.has_headroom(0));
        assert!(DailyQuota::Unlimited.has_headroom(1_000_000));
    }

    #[test]
    fn reset_predicate_uses_calendar_days() {
        use chrono::Duration;
        let now = Utc::now();
        let sub = Subscription {
            id: 1,
            account_id: 1,
            category: "chat".to_string(),
            plan: "chat_starter".to_string(),
            daily_limit: 20,
            start_date: now - Duration::days(2),
            end_date: now + Duration::days(5),
            usage_today: 20,
            last_reset_date: now - Duration::days(1),
        };
        // Reset on a previous calendar day means today's usage is stale.
        assert!(sub.needs_daily_reset(now));

        let fresh = Subscription { last_reset_date: now, ..sub };
        assert!(!fresh.needs_daily_reset(now));
    }

    #[test]
    fn category_round_trip() {
        for c in [SubscriptionCategory::Chat, SubscriptionCategory::Image] {
            assert_eq!(SubscriptionCategory::from_str(c.as_str()).unwrap(), c);
        }
        assert!(SubscriptionCategory::from_str("video").is_err());
    }
}
