use aigenie_db::models::{Product, SubscriptionCategory};
use teloxide::prelude::*;
use teloxide::types::{ForceReply, LabeledPrice};
use tracing::{error, info};

use crate::bot::keyboards::{pay_rail_keyboard, plans_keyboard};
use crate::catalog;
use crate::services::pay_service::{PaymentPayload, PurchaseKind};
use crate::AppState;

/// Everything a callback button can mean, decoded up front so the handler
/// body never re-parses `data` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    ShowPlans(SubscriptionCategory),
    Buy { kind: PurchaseKind, code: String },
    Pay { rail: PayRail, kind: PurchaseKind, code: String },
    PickImageProduct(Product),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayRail {
    Stars,
    Crypto,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        match parts.next()? {
            "plans" => {
                let category = SubscriptionCategory::from_str(parts.next()?).ok()?;
                Some(Self::ShowPlans(category))
            }
            "buy" => {
                let kind = parse_kind(parts.next()?)?;
                let code = parts.next()?.to_string();
                find_item(kind, &code)?;
                Some(Self::Buy { kind, code })
            }
            "pay" => {
                let rail = match parts.next()? {
                    "stars" => PayRail::Stars,
                    "crypto" => PayRail::Crypto,
                    _ => return None,
                };
                let kind = parse_kind(parts.next()?)?;
                let code = parts.next()?.to_string();
                find_item(kind, &code)?;
                Some(Self::Pay { rail, kind, code })
            }
            "gen" => {
                let product = Product::from_code(parts.next()?).ok()?;
                Some(Self::PickImageProduct(product))
            }
            _ => None,
        }
    }
}

fn parse_kind(s: &str) -> Option<PurchaseKind> {
    match s {
        "pack" => Some(PurchaseKind::Pack),
        "plan" => Some(PurchaseKind::Plan),
        _ => None,
    }
}

/// Title and Stars price of a catalog item, confirming the code exists.
fn find_item(kind: PurchaseKind, code: &str) -> Option<(&'static str, u32)> {
    match kind {
        PurchaseKind::Pack => catalog::find_pack(code).map(|p| (p.title, p.price_stars)),
        PurchaseKind::Plan => catalog::find_plan(code).map(|p| (p.title, p.price_stars)),
    }
}

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();
    let account_id = q.from.id.0 as i64;

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };
    let Some(msg) = q.message else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };
    let chat_id = msg.chat().id;

    match action {
        CallbackAction::ShowPlans(category) => {
            let _ = bot.answer_callback_query(callback_id).await;
            let label = match category {
                SubscriptionCategory::Chat => "💬 Chat plans",
                SubscriptionCategory::Image => "🎨 Image plans",
            };
            let _ = bot
                .send_message(chat_id, format!("{label} — pick one:"))
                .reply_markup(plans_keyboard(category))
                .await;
        }

        CallbackAction::Buy { kind, code } => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some((title, price_stars)) = find_item(kind, &code) {
                let kind_str = match kind {
                    PurchaseKind::Pack => "pack",
                    PurchaseKind::Plan => "plan",
                };
                let _ = bot
                    .send_message(
                        chat_id,
                        format!("🧾 {title} — {price_stars}⭐\nChoose how to pay:"),
                    )
                    .reply_markup(pay_rail_keyboard(kind_str, &code))
                    .await;
            }
        }

        CallbackAction::Pay { rail, kind, code } => {
            let Some((title, price_stars)) = find_item(kind, &code) else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            let payload = match kind {
                PurchaseKind::Pack => PaymentPayload::pack(account_id, &code),
                PurchaseKind::Plan => PaymentPayload::plan(account_id, &code),
            };

            match rail {
                PayRail::Stars => {
                    let _ = bot.answer_callback_query(callback_id).await;
                    let prices = vec![LabeledPrice {
                        label: title.to_string(),
                        amount: price_stars,
                    }];
                    let _ = bot
                        .send_invoice(
                            chat_id,
                            title.to_string(),
                            format!("{title} for your account"),
                            payload.encode(),
                            "XTR",
                            prices,
                        )
                        .await;
                }
                PayRail::Crypto => {
                    match state.pay_service.create_cryptopay_invoice(&payload).await {
                        Ok(url) => {
                            let _ = bot.answer_callback_query(callback_id).await;
                            let _ = bot
                                .send_message(
                                    chat_id,
                                    format!("🪙 Pay {title} here:\n{url}\n\nCredits arrive automatically after payment."),
                                )
                                .await;
                        }
                        Err(e) => {
                            error!(account_id, code, "crypto invoice creation failed: {e:#}");
                            let _ = bot
                                .answer_callback_query(callback_id)
                                .text("❌ Could not create the invoice, try again later.")
                                .show_alert(true)
                                .await;
                        }
                    }
                }
            }
        }

        CallbackAction::PickImageProduct(product) => {
            let _ = bot.answer_callback_query(callback_id).await;
            let _ = bot
                .send_message(
                    chat_id,
                    format!(
                        "🎨 Prompt for {}\nReply to this message with what you want to see.",
                        product.code()
                    ),
                )
                .reply_markup(ForceReply::new())
                .await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plan_listing() {
        assert_eq!(
            CallbackAction::parse("plans:chat"),
            Some(CallbackAction::ShowPlans(SubscriptionCategory::Chat))
        );
        assert_eq!(
            CallbackAction::parse("plans:image"),
            Some(CallbackAction::ShowPlans(SubscriptionCategory::Image))
        );
        assert_eq!(CallbackAction::parse("plans:video"), None);
    }

    #[test]
    fn parses_buy_and_pay() {
        assert_eq!(
            CallbackAction::parse("buy:plan:chat_starter"),
            Some(CallbackAction::Buy {
                kind: PurchaseKind::Plan,
                code: "chat_starter".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("pay:stars:pack:pack_dalle"),
            Some(CallbackAction::Pay {
                rail: PayRail::Stars,
                kind: PurchaseKind::Pack,
                code: "pack_dalle".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("pay:crypto:plan:image_maximum"),
            Some(CallbackAction::Pay {
                rail: PayRail::Crypto,
                kind: PurchaseKind::Plan,
                code: "image_maximum".to_string()
            })
        );
        // Unknown catalog codes never become actions.
        assert_eq!(CallbackAction::parse("buy:plan:chat_mega"), None);
        assert_eq!(CallbackAction::parse("pay:paypal:plan:chat_starter"), None);
    }

    #[test]
    fn parses_image_product_choice() {
        assert_eq!(
            CallbackAction::parse("gen:midjourney"),
            Some(CallbackAction::PickImageProduct(Product::MidJourney))
        );
        assert_eq!(CallbackAction::parse("gen:sora"), None);
        assert_eq!(CallbackAction::parse("garbage"), None);
    }
}
