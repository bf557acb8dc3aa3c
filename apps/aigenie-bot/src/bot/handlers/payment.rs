use teloxide::prelude::*;
use teloxide::types::PreCheckoutQuery;
use tracing::info;

/// Stars checkout gate. The payload was validated when the invoice was
/// built, so every pre-checkout is accepted; settlement runs on the
/// successful-payment update.
pub async fn pre_checkout_handler(
    bot: Bot,
    q: PreCheckoutQuery,
) -> Result<(), teloxide::RequestError> {
    info!(payload = %q.invoice_payload, "pre-checkout query accepted");
    bot.answer_pre_checkout_query(q.id, true).await?;
    Ok(())
}
