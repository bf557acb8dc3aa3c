use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tracing::{error, info, warn};

use crate::services::pay_service::{Fulfillment, WebhookError};
use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/cryptopay", post(cryptopay_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Crypto Pay paid-invoice notifications. The provider retries non-2xx
/// responses, so validation failures answer 400 (final) and persistence
/// failures answer 500 (retryable; crediting is idempotent).
async fn cryptopay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    let signature = headers
        .get("crypto-pay-api-signature")
        .and_then(|v| v.to_str().ok());

    match state.pay_service.handle_cryptopay_webhook(&body, signature).await {
        Ok(fulfillment) => {
            match fulfillment {
                Fulfillment::PackCredited { code, new_balance } => {
                    info!(code, new_balance, "webhook credited pack");
                }
                Fulfillment::PlanActivated(sub) => {
                    info!(account_id = sub.account_id, plan = %sub.plan, "webhook activated plan");
                }
                Fulfillment::Duplicate => info!("webhook replay resolved as duplicate"),
                Fulfillment::Ignored => info!("webhook update type ignored"),
            }
            (StatusCode::OK, "OK")
        }
        Err(WebhookError::Rejected(e)) => {
            warn!("webhook rejected: {e}");
            (StatusCode::BAD_REQUEST, "bad request")
        }
        Err(WebhookError::Persistence(e)) => {
            error!("webhook processing failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
