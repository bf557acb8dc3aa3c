use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use aigenie_db::models::SubscriptionCategory;

use crate::catalog;

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new("💬 Chat"), KeyboardButton::new("🎨 Image")],
        vec![KeyboardButton::new("💎 Plans"), KeyboardButton::new("📦 Credit Packs")],
        vec![KeyboardButton::new("👤 My Profile"), KeyboardButton::new("🎁 Referral")],
    ])
    .resize_keyboard()
}

pub fn plan_categories_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("💬 Chat plans", "plans:chat"),
        InlineKeyboardButton::callback("🎨 Image plans", "plans:image"),
    ]])
}

pub fn plans_keyboard(category: SubscriptionCategory) -> InlineKeyboardMarkup {
    let rows = catalog::plans_for(category)
        .map(|plan| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {}⭐", plan.title, plan.price_stars),
                format!("buy:plan:{}", plan.code),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn packs_keyboard() -> InlineKeyboardMarkup {
    let rows = catalog::PACKS
        .iter()
        .map(|pack| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {}⭐", pack.title, pack.price_stars),
                format!("buy:pack:{}", pack.code),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Rail selection for a chosen catalog item.
pub fn pay_rail_keyboard(kind: &str, code: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("⭐ Telegram Stars", format!("pay:stars:{kind}:{code}")),
        InlineKeyboardButton::callback("🪙 Crypto", format!("pay:crypto:{kind}:{code}")),
    ]])
}

pub fn image_products_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("DALL-E", "gen:dalle"),
            InlineKeyboardButton::callback("Stable Diffusion", "gen:stable"),
        ],
        vec![InlineKeyboardButton::callback("Midjourney", "gen:midjourney")],
    ])
}
