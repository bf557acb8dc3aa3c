use aigenie_db::models::Product;
use aigenie_db::repositories::LedgerRepository;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{error, info};

use crate::bot::keyboards::{
    image_products_keyboard, main_menu, packs_keyboard, plan_categories_keyboard,
};
use crate::services::entitlement_service::{AccessVerdict, DenyReason};
use crate::services::pay_service::Fulfillment;
use crate::services::referral_service::{parse_start_param, ReferralOutcome};
use crate::AppState;

const IMAGE_PROMPT_MARKER: &str = "🎨 Prompt for ";

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let account_id = msg.chat.id.0;

    if let Some(payment) = msg.successful_payment() {
        return handle_successful_payment(&bot, &msg, &state, payment).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with("/start") {
        return handle_start(&bot, &msg, &state, text).await;
    }

    // Image prompts come back as replies to the product picker message.
    if let Some(product) = replied_image_product(&msg) {
        return run_image_generation(&bot, &msg, &state, account_id, product, text).await;
    }

    match text {
        "💬 Chat" => {
            let _ = bot
                .send_message(msg.chat.id, "💬 Just send me a message and I'll answer.")
                .await;
        }
        "🎨 Image" => {
            let _ = bot
                .send_message(msg.chat.id, "🎨 Pick an image model:")
                .reply_markup(image_products_keyboard())
                .await;
        }
        "💎 Plans" => {
            let _ = bot
                .send_message(msg.chat.id, "💎 Subscription plans:")
                .reply_markup(plan_categories_keyboard())
                .await;
        }
        "📦 Credit Packs" => {
            let _ = bot
                .send_message(msg.chat.id, "📦 One-off credit packs:")
                .reply_markup(packs_keyboard())
                .await;
        }
        "👤 My Profile" => {
            if let Err(e) = send_profile(&bot, &msg, &state, account_id).await {
                error!(account_id, "profile rendering failed: {e:#}");
            }
        }
        "🎁 Referral" => {
            if let Err(e) = send_referral_info(&bot, &msg, &state, account_id).await {
                error!(account_id, "referral info failed: {e:#}");
            }
        }
        prompt => {
            return run_chat_generation(&bot, &msg, &state, account_id, prompt).await;
        }
    }

    Ok(())
}

async fn handle_start(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    let account_id = msg.chat.id.0;
    let raw_referrer = text.strip_prefix("/start ").and_then(parse_start_param);
    // Vet before ensure_account runs, so a self or ghost referrer is never
    // persisted on the account row.
    let referrer_id = match state.referral_service.vet_referrer(account_id, raw_referrer).await {
        Ok(vetted) => vetted,
        Err(e) => {
            error!(account_id, "referrer vetting failed: {e:#}");
            None
        }
    };

    let ledger = LedgerRepository::new(state.pool.clone());
    match ledger.ensure_account(account_id, referrer_id).await {
        Ok((_, created)) => {
            if created {
                info!(account_id, ?referrer_id, "account created");
                match state.referral_service.attribute(account_id, referrer_id).await {
                    Ok(ReferralOutcome::Credited { referrer_id }) => {
                        // The referrer hears about the bonus; the new user's
                        // onboarding is identical either way.
                        let _ = bot
                            .send_message(
                                ChatId(referrer_id),
                                "🎁 A friend joined through your link! Bonus credits added.",
                            )
                            .await;
                    }
                    Ok(_) => {}
                    Err(e) => error!(account_id, "referral attribution failed: {e:#}"),
                }
            }
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "👋 Welcome! You have free starter credits — send a message to chat, \
                     or use the menu to generate images and browse plans.",
                )
                .reply_markup(main_menu())
                .await;
        }
        Err(e) => {
            error!(account_id, "account creation failed: {e:#}");
            let _ = bot
                .send_message(msg.chat.id, "❌ Something went wrong, please try again.")
                .await;
        }
    }
    Ok(())
}

async fn handle_successful_payment(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    payment: &teloxide::types::SuccessfulPayment,
) -> Result<(), teloxide::RequestError> {
    let account_id = msg.chat.id.0;
    info!(
        account_id,
        amount = payment.total_amount,
        "processing stars payment"
    );

    let result = state
        .pay_service
        .handle_stars_payment(
            &payment.currency.to_string(),
            &payment.telegram_payment_charge_id.0,
            &payment.invoice_payload,
        )
        .await;

    match result {
        Ok(Fulfillment::PackCredited { new_balance, .. }) => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    format!("✅ Payment received! New balance: {new_balance}."),
                )
                .await;
        }
        Ok(Fulfillment::PlanActivated(sub)) => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    format!(
                        "✅ Plan activated until {}.",
                        sub.end_date.format("%Y-%m-%d")
                    ),
                )
                .await;
        }
        Ok(Fulfillment::Duplicate) | Ok(Fulfillment::Ignored) => {
            let _ = bot
                .send_message(msg.chat.id, "✅ Payment already processed.")
                .await;
        }
        Err(e) => {
            error!(account_id, "stars payment processing failed: {e}");
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "❌ Error processing payment. Please contact support.",
                )
                .await;
        }
    }
    Ok(())
}

fn replied_image_product(msg: &Message) -> Option<Product> {
    parse_image_prompt_marker(msg.reply_to_message()?.text()?)
}

fn parse_image_prompt_marker(replied: &str) -> Option<Product> {
    let rest = replied.strip_prefix(IMAGE_PROMPT_MARKER)?;
    let code = rest.split_whitespace().next()?;
    Product::from_code(code).ok()
}

async fn run_chat_generation(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    account_id: i64,
    prompt: &str,
) -> Result<(), teloxide::RequestError> {
    let verdict = match state.entitlement_service.check(account_id, Product::ChatGpt).await {
        Ok(v) => v,
        Err(e) => {
            error!(account_id, "entitlement check failed: {e:#}");
            let _ = bot
                .send_message(msg.chat.id, "❌ Something went wrong, please try again.")
                .await;
            return Ok(());
        }
    };

    let via = match verdict {
        AccessVerdict::Allowed(via) => via,
        AccessVerdict::Denied(DenyReason::QuotaExhausted) => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "🚫 You're out of chat credits for now. Check 💎 Plans or 📦 Credit Packs.",
                )
                .await;
            return Ok(());
        }
    };

    match state.gen_client.chat(prompt).await {
        Ok(answer) => {
            // Charge only after the provider delivered.
            if let Err(e) = state
                .entitlement_service
                .commit(account_id, Product::ChatGpt, via)
                .await
            {
                error!(account_id, "consumption commit failed: {e:#}");
            }
            let _ = bot.send_message(msg.chat.id, answer).await;
        }
        Err(e) => {
            error!(account_id, "chat generation failed: {e:#}");
            let _ = bot
                .send_message(msg.chat.id, "❌ Generation failed, nothing was charged.")
                .await;
        }
    }
    Ok(())
}

async fn run_image_generation(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    account_id: i64,
    product: Product,
    prompt: &str,
) -> Result<(), teloxide::RequestError> {
    let verdict = match state.entitlement_service.check(account_id, product).await {
        Ok(v) => v,
        Err(e) => {
            error!(account_id, "entitlement check failed: {e:#}");
            let _ = bot
                .send_message(msg.chat.id, "❌ Something went wrong, please try again.")
                .await;
            return Ok(());
        }
    };

    let via = match verdict {
        AccessVerdict::Allowed(via) => via,
        AccessVerdict::Denied(DenyReason::QuotaExhausted) => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "🚫 You're out of image credits for now. Check 💎 Plans or 📦 Credit Packs.",
                )
                .await;
            return Ok(());
        }
    };

    match state.gen_client.image(product, prompt).await {
        Ok(url) => {
            if let Err(e) = state.entitlement_service.commit(account_id, product, via).await {
                error!(account_id, "consumption commit failed: {e:#}");
            }
            let _ = bot
                .send_message(msg.chat.id, format!("🎨 Here you go:\n{url}"))
                .await;
        }
        Err(e) => {
            error!(account_id, product = product.code(), "image generation failed: {e:#}");
            let _ = bot
                .send_message(msg.chat.id, "❌ Generation failed, nothing was charged.")
                .await;
        }
    }
    Ok(())
}

async fn send_profile(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    account_id: i64,
) -> anyhow::Result<()> {
    let Some(account) = state.pay_service.display_balances(account_id).await? else {
        bot.send_message(msg.chat.id, "Send /start first.").await?;
        return Ok(());
    };
    let subs = state.subscription_service.list_active(account_id).await?;
    let referrals = state.referral_service.count_for(account_id).await?;

    let mut text = format!(
        "👤 Your profile\n\n\
         💬 Chat tokens: {}\n\
         🖼 DALL-E: {}\n\
         🖼 Stable Diffusion: {}\n\
         🖼 Midjourney: {}\n",
        account.chatgpt, account.dalle, account.stable, account.midjourney
    );

    if subs.is_empty() {
        text.push_str("\nNo active plans.\n");
    } else {
        text.push_str("\nActive plans:\n");
        let now = chrono::Utc::now();
        for sub in subs {
            // list_active does not run the lazy reset, so show stale usage as 0.
            let usage = if sub.needs_daily_reset(now) { 0 } else { sub.usage_today };
            let quota = match sub.quota() {
                aigenie_db::models::DailyQuota::Unlimited => "unlimited".to_string(),
                aigenie_db::models::DailyQuota::Limited(n) => {
                    format!("{usage}/{n} today")
                }
            };
            text.push_str(&format!(
                "• {} — {} (until {})\n",
                sub.plan,
                quota,
                sub.end_date.format("%Y-%m-%d")
            ));
        }
    }
    text.push_str(&format!("\n🎁 Referrals: {referrals}\n"));

    let ledger = LedgerRepository::new(state.pool.clone());
    let entries = ledger.history(account_id, 5).await?;
    if !entries.is_empty() {
        text.push_str("\nRecent activity:\n");
        for entry in entries {
            let sign = if entry.amount >= 0 { "+" } else { "" };
            text.push_str(&format!(
                "• {} {}{} ({})\n",
                entry.created_at.format("%Y-%m-%d"),
                sign,
                entry.amount,
                entry.product
            ));
        }
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn send_referral_info(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    account_id: i64,
) -> anyhow::Result<()> {
    let me = bot.get_me().await?;
    let username = me.username.clone().unwrap_or_default();
    let referrals = state.referral_service.list_for(account_id).await?;

    let mut text = format!(
        "🎁 Invite friends and earn bonus credits!\n\n\
         Your link: https://t.me/{username}?start=ref{account_id}\n\
         Friends joined: {}\n",
        referrals.len()
    );
    if !referrals.is_empty() {
        text.push_str("\nLatest:\n");
        for referral in referrals.iter().take(5) {
            text.push_str(&format!(
                "• joined {}\n",
                referral.joined_at.format("%Y-%m-%d")
            ));
        }
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_prompt_marker_round_trip() {
        let replied = "🎨 Prompt for stable\nReply to this message with what you want to see.";
        assert_eq!(parse_image_prompt_marker(replied), Some(Product::StableDiffusion));

        assert_eq!(parse_image_prompt_marker("🎨 Prompt for sora\n..."), None);
        assert_eq!(parse_image_prompt_marker("unrelated reply"), None);
    }
}
