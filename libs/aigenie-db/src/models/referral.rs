use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Product;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Referral {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_id: i64,
    pub joined_at: DateTime<Utc>,
    pub bonus_given: bool,
}

/// Per-product credits granted to a referrer exactly once per referred account.
#[derive(Debug, Clone, Copy)]
pub struct BonusAmounts {
    pub chatgpt: i32,
    pub dalle: i32,
    pub stable: i32,
    pub midjourney: i32,
}

impl BonusAmounts {
    pub fn per_product(&self) -> [(Product, i32); 4] {
        [
            (Product::ChatGpt, self.chatgpt),
            (Product::DallE, self.dalle),
            (Product::StableDiffusion, self.stable),
            (Product::MidJourney, self.midjourney),
        ]
    }
}

impl Default for BonusAmounts {
    fn default() -> Self {
        Self {
            chatgpt: 5000,
            dalle: 5,
            stable: 5,
            midjourney: 5,
        }
    }
}
