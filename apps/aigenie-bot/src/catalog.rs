use aigenie_db::models::{DailyQuota, Product, SubscriptionCategory};

/// A recurring plan: daily-metered access to one generation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub code: &'static str,
    pub category: SubscriptionCategory,
    pub title: &'static str,
    pub price_stars: u32,
    pub quota: DailyQuota,
    pub duration_days: i64,
}

/// A one-off credit pack: a fixed top-up of a single product balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pack {
    pub code: &'static str,
    pub product: Product,
    pub title: &'static str,
    pub price_stars: u32,
    pub amount: i32,
}

pub const PLANS: &[Plan] = &[
    Plan {
        code: "chat_starter",
        category: SubscriptionCategory::Chat,
        title: "Chat Starter",
        price_stars: 100,
        quota: DailyQuota::Limited(20),
        duration_days: 7,
    },
    Plan {
        code: "chat_advanced",
        category: SubscriptionCategory::Chat,
        title: "Chat Advanced",
        price_stars: 250,
        quota: DailyQuota::Limited(50),
        duration_days: 14,
    },
    Plan {
        code: "chat_expert",
        category: SubscriptionCategory::Chat,
        title: "Chat Expert",
        price_stars: 450,
        quota: DailyQuota::Unlimited,
        duration_days: 30,
    },
    Plan {
        code: "image_mini",
        category: SubscriptionCategory::Image,
        title: "Image Mini",
        price_stars: 80,
        quota: DailyQuota::Limited(5),
        duration_days: 7,
    },
    Plan {
        code: "image_standard",
        category: SubscriptionCategory::Image,
        title: "Image Standard",
        price_stars: 180,
        quota: DailyQuota::Limited(15),
        duration_days: 14,
    },
    Plan {
        code: "image_maximum",
        category: SubscriptionCategory::Image,
        title: "Image Maximum",
        price_stars: 350,
        quota: DailyQuota::Limited(30),
        duration_days: 30,
    },
];

pub const PACKS: &[Pack] = &[
    Pack {
        code: "pack_chatgpt",
        product: Product::ChatGpt,
        title: "100 000 chat tokens",
        price_stars: 20,
        amount: 100_000,
    },
    Pack {
        code: "pack_dalle",
        product: Product::DallE,
        title: "50 DALL-E generations",
        price_stars: 20,
        amount: 50,
    },
    Pack {
        code: "pack_stable",
        product: Product::StableDiffusion,
        title: "50 Stable Diffusion generations",
        price_stars: 20,
        amount: 50,
    },
    Pack {
        code: "pack_midjourney",
        product: Product::MidJourney,
        title: "50 Midjourney generations",
        price_stars: 20,
        amount: 50,
    },
];

pub fn find_plan(code: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.code == code)
}

pub fn find_pack(code: &str) -> Option<&'static Pack> {
    PACKS.iter().find(|p| p.code == code)
}

pub fn plans_for(category: SubscriptionCategory) -> impl Iterator<Item = &'static Plan> {
    PLANS.iter().filter(move |p| p.category == category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_codes_are_unique() {
        for (i, a) in PLANS.iter().enumerate() {
            for b in &PLANS[i + 1..] {
                assert_ne!(a.code, b.code);
            }
        }
    }

    #[test]
    fn lookup_by_code() {
        let plan = find_plan("chat_expert").unwrap();
        assert_eq!(plan.price_stars, 450);
        assert_eq!(plan.quota, DailyQuota::Unlimited);
        assert_eq!(plan.duration_days, 30);

        let pack = find_pack("pack_chatgpt").unwrap();
        assert_eq!(pack.amount, 100_000);
        assert_eq!(pack.product, Product::ChatGpt);

        assert!(find_plan("chat_mega").is_none());
        assert!(find_pack("pack_unknown").is_none());
    }

    #[test]
    fn plans_filtered_by_category() {
        let chat: Vec<_> = plans_for(SubscriptionCategory::Chat).collect();
        assert_eq!(chat.len(), 3);
        assert!(chat.iter().all(|p| p.category == SubscriptionCategory::Chat));

        let image: Vec<_> = plans_for(SubscriptionCategory::Image).collect();
        assert_eq!(image.len(), 3);
    }
}
