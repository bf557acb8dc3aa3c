use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// A metered product. The code doubles as the `accounts` column name and the
/// stable identifier inside payment payloads, so it must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    ChatGpt,
    DallE,
    StableDiffusion,
    MidJourney,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::ChatGpt,
        Product::DallE,
        Product::StableDiffusion,
        Product::MidJourney,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Product::ChatGpt => "chatgpt",
            Product::DallE => "dalle",
            Product::StableDiffusion => "stable",
            Product::MidJourney => "midjourney",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, PayloadError> {
        match code {
            "chatgpt" => Ok(Product::ChatGpt),
            "dalle" => Ok(Product::DallE),
            "stable" => Ok(Product::StableDiffusion),
            "midjourney" => Ok(Product::MidJourney),
            other => Err(PayloadError::UnknownProduct(other.to_string())),
        }
    }

    /// Category of subscription that covers this product.
    pub fn category(&self) -> super::SubscriptionCategory {
        match self {
            Product::ChatGpt => super::SubscriptionCategory::Chat,
            _ => super::SubscriptionCategory::Image,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub chatgpt: i32,
    pub dalle: i32,
    pub stable: i32,
    pub midjourney: i32,
    pub referrer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn balance(&self, product: Product) -> i32 {
        match product {
            Product::ChatGpt => self.chatgpt,
            Product::DallE => self.dalle,
            Product::StableDiffusion => self.stable,
            Product::MidJourney => self.midjourney,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_codes_round_trip() {
        for p in Product::ALL {
            assert_eq!(Product::from_code(p.code()).unwrap(), p);
        }
    }

    #[test]
    fn unknown_product_code_is_rejected() {
        assert!(Product::from_code("sora").is_err());
        assert!(Product::from_code("").is_err());
    }

    #[test]
    fn only_chatgpt_is_chat_category() {
        use crate::models::SubscriptionCategory;
        assert_eq!(Product::ChatGpt.category(), SubscriptionCategory::Chat);
        for p in [Product::DallE, Product::StableDiffusion, Product::MidJourney] {
            assert_eq!(p.category(), SubscriptionCategory::Image);
        }
    }
}
