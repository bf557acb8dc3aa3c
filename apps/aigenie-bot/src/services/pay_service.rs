use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aigenie_db::error::PayloadError;
use aigenie_db::models::{Account, Subscription, TxOutcome};
use aigenie_db::repositories::{LedgerRepository, OrderRepository, PlanActivation};
use aigenie_db::PgPool;
use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog;
use crate::config::Config;
use crate::services::subscription_service::SubscriptionService;

/// What a payment buys, tagged into the opaque payload string both rails
/// round-trip: `"{account}:{pack|plan}:{code}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseKind {
    Pack,
    Plan,
}

impl PurchaseKind {
    fn as_str(self) -> &'static str {
        match self {
            PurchaseKind::Pack => "pack",
            PurchaseKind::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPayload {
    pub account_id: i64,
    pub kind: PurchaseKind,
    pub code: String,
}

impl PaymentPayload {
    pub fn pack(account_id: i64, code: &str) -> Self {
        Self { account_id, kind: PurchaseKind::Pack, code: code.to_string() }
    }

    pub fn plan(account_id: i64, code: &str) -> Self {
        Self { account_id, kind: PurchaseKind::Plan, code: code.to_string() }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.account_id, self.kind.as_str(), self.code)
    }

    /// Decodes and validates a payload string. The code must resolve in the
    /// catalog, so a stale payload for a withdrawn item is rejected here
    /// rather than surfacing as a fulfillment error.
    pub fn decode(raw: &str) -> Result<Self, PayloadError> {
        let mut parts = raw.splitn(3, ':');
        let account_id: i64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PayloadError::InvalidPayload(raw.to_string()))?;
        let kind = match parts.next() {
            Some("pack") => PurchaseKind::Pack,
            Some("plan") => PurchaseKind::Plan,
            _ => return Err(PayloadError::InvalidPayload(raw.to_string())),
        };
        let code = parts
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PayloadError::InvalidPayload(raw.to_string()))?;

        let known = match kind {
            PurchaseKind::Pack => catalog::find_pack(code).is_some(),
            PurchaseKind::Plan => catalog::find_plan(code).is_some(),
        };
        if !known {
            return Err(PayloadError::UnknownItem(code.to_string()));
        }

        Ok(Self { account_id, kind, code: code.to_string() })
    }
}

/// Crypto Pay webhook body, reduced to the fields the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    InvoicePaid { invoice_id: i64 },
    /// Any other update type: acknowledged without touching the ledger.
    Ignored,
}

pub fn parse_webhook_body(body: &str) -> Result<WebhookEvent, PayloadError> {
    #[derive(Deserialize)]
    struct Update {
        update_type: String,
        #[serde(default)]
        payload: Option<UpdatePayload>,
    }
    #[derive(Deserialize)]
    struct UpdatePayload {
        invoice_id: Option<i64>,
    }

    let update: Update = serde_json::from_str(body)
        .map_err(|e| PayloadError::MalformedBody(e.to_string()))?;

    if update.update_type != "invoice_paid" {
        return Ok(WebhookEvent::Ignored);
    }
    let invoice_id = update
        .payload
        .and_then(|p| p.invoice_id)
        .ok_or_else(|| PayloadError::MalformedBody("missing payload.invoice_id".to_string()))?;
    Ok(WebhookEvent::InvoicePaid { invoice_id })
}

pub fn validate_stars_currency(currency: &str) -> Result<(), PayloadError> {
    if currency == "XTR" {
        Ok(())
    } else {
        Err(PayloadError::WrongCurrency(currency.to_string()))
    }
}

/// Result of settling one payment notification. `Duplicate` means the
/// idempotency key was already recorded; callers treat it as success.
#[derive(Debug, Clone)]
pub enum Fulfillment {
    PackCredited { code: String, new_balance: i32 },
    PlanActivated(Subscription),
    Duplicate,
    /// A webhook update type the reconciler does not act on.
    Ignored,
}

/// Webhook processing failure, split along the retryability line: rejected
/// inputs are final, persistence faults are safe to redeliver because every
/// mutation behind them is idempotent.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Rejected(#[from] PayloadError),
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

/// Display-only cache of account balances, so the profile screen does not hit
/// the ledger on every render. Debit decisions never consult it; any credit
/// drops the entry.
#[derive(Clone, Default)]
pub struct BalanceCache {
    entries: Arc<Mutex<HashMap<i64, (Instant, Account)>>>,
    ttl: Duration,
}

impl BalanceCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), ttl }
    }

    pub fn get(&self, account_id: i64) -> Option<Account> {
        let entries = self.entries.lock().ok()?;
        let (at, account) = entries.get(&account_id)?;
        (at.elapsed() < self.ttl).then(|| account.clone())
    }

    pub fn put(&self, account: Account) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(account.id, (Instant::now(), account));
        }
    }

    pub fn invalidate(&self, account_id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&account_id);
        }
    }
}

#[derive(Debug, Deserialize)]
struct CryptoPayEnvelope<T> {
    ok: bool,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedInvoice {
    invoice_id: i64,
    bot_invoice_url: String,
}

/// Payment reconciler: invoice creation and exactly-once crediting for both
/// rails (Crypto Pay webhooks and Telegram Stars).
#[derive(Clone)]
pub struct PayService {
    ledger: LedgerRepository,
    orders: OrderRepository,
    subscriptions: SubscriptionService,
    http: reqwest::Client,
    cryptopay_token: String,
    cryptopay_api_url: String,
    balance_cache: BalanceCache,
}

impl PayService {
    /// The cache is shared with every other path that credits balances (the
    /// referral bonus in particular), so a credit anywhere drops the entry.
    pub fn new(pool: PgPool, config: &Config, balance_cache: BalanceCache) -> Self {
        Self {
            ledger: LedgerRepository::new(pool.clone()),
            orders: OrderRepository::new(pool.clone()),
            subscriptions: SubscriptionService::new(pool),
            http: reqwest::Client::new(),
            cryptopay_token: config.cryptopay_token.clone(),
            cryptopay_api_url: config.cryptopay_api_url.clone(),
            balance_cache,
        }
    }

    /// Creates a Crypto Pay invoice and stashes an order row keyed by its
    /// invoice id, because the paid-webhook carries nothing but that id.
    pub async fn create_cryptopay_invoice(&self, payload: &PaymentPayload) -> Result<String> {
        // Stars are the canonical price unit; 1 USD is about 50 XTR.
        let price_stars = match payload.kind {
            PurchaseKind::Pack => catalog::find_pack(&payload.code).map(|p| p.price_stars),
            PurchaseKind::Plan => catalog::find_plan(&payload.code).map(|p| p.price_stars),
        }
        .ok_or_else(|| anyhow::anyhow!("unknown catalog code: {}", payload.code))?;
        let amount_usd = price_stars as f64 / 50.0;

        let body = serde_json::json!({
            "asset": "USDT",
            "amount": format!("{:.2}", amount_usd),
            "payload": payload.encode(),
            "description": format!("aigenie purchase: {}", payload.code),
        });

        let resp: CryptoPayEnvelope<CreatedInvoice> = self
            .http
            .post(format!("{}/createInvoice", self.cryptopay_api_url))
            .header("Crypto-Pay-API-Token", &self.cryptopay_token)
            .json(&body)
            .send()
            .await
            .context("Crypto Pay createInvoice request failed")?
            .json()
            .await
            .context("Crypto Pay createInvoice returned malformed JSON")?;

        let invoice = match (resp.ok, resp.result) {
            (true, Some(inv)) => inv,
            _ => anyhow::bail!("Crypto Pay createInvoice rejected the request"),
        };

        self.orders
            .create(invoice.invoice_id, payload.account_id, &payload.code)
            .await?;

        info!(
            invoice_id = invoice.invoice_id,
            account_id = payload.account_id,
            code = %payload.code,
            "crypto invoice created"
        );
        Ok(invoice.bot_invoice_url)
    }

    /// Checks the `crypto-pay-api-signature` header: hex SHA-256 over the API
    /// token concatenated with the raw body.
    pub fn verify_cryptopay_signature(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<(), PayloadError> {
        let sig = signature.ok_or(PayloadError::BadSignature)?;
        let mut hasher = Sha256::new();
        hasher.update(self.cryptopay_token.as_bytes());
        hasher.update(body.as_bytes());
        let expected = hex::encode(hasher.finalize());
        if sig == expected {
            Ok(())
        } else {
            Err(PayloadError::BadSignature)
        }
    }

    /// Full webhook path: verify, parse, resolve the stashed order, credit.
    /// Redelivery of an already-settled invoice resolves to `Duplicate`.
    pub async fn handle_cryptopay_webhook(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<Fulfillment, WebhookError> {
        self.verify_cryptopay_signature(body, signature)?;

        let invoice_id = match parse_webhook_body(body)? {
            WebhookEvent::InvoicePaid { invoice_id } => invoice_id,
            WebhookEvent::Ignored => return Ok(Fulfillment::Ignored),
        };

        let order = self
            .orders
            .get(invoice_id)
            .await
            .map_err(WebhookError::Persistence)?
            .ok_or_else(|| {
                PayloadError::MalformedBody(format!("unknown invoice_id {invoice_id}"))
            })?;

        let payment_id = format!("cryptobot:{invoice_id}");
        self.fulfill(&payment_id, order.account_id, &order.item_code)
            .await
            .map_err(WebhookError::from)
    }

    /// Telegram Stars settlement, called from the successful-payment update.
    /// The charge id is the idempotency key, so Telegram re-sending the
    /// update cannot double-credit.
    pub async fn handle_stars_payment(
        &self,
        currency: &str,
        charge_id: &str,
        invoice_payload: &str,
    ) -> Result<Fulfillment, WebhookError> {
        validate_stars_currency(currency)?;
        let payload = PaymentPayload::decode(invoice_payload)?;

        let payment_id = format!("stars:{charge_id}");
        let kind = match payload.kind {
            PurchaseKind::Pack => "pack",
            PurchaseKind::Plan => "plan",
        };
        info!(account_id = payload.account_id, kind, code = %payload.code, "stars payment received");

        self.fulfill(&payment_id, payload.account_id, &payload.code)
            .await
            .map_err(WebhookError::from)
    }

    async fn fulfill(&self, payment_id: &str, account_id: i64, code: &str) -> Result<Fulfillment> {
        if let Some(pack) = catalog::find_pack(code) {
            let outcome = self
                .ledger
                .apply_transaction(payment_id, account_id, pack.product, pack.amount)
                .await?;
            return Ok(match outcome {
                TxOutcome::Applied(new_balance) => {
                    self.balance_cache.invalidate(account_id);
                    info!(account_id, code, new_balance, "pack credited");
                    Fulfillment::PackCredited { code: code.to_string(), new_balance }
                }
                TxOutcome::Duplicate => {
                    info!(account_id, payment_id, "duplicate pack payment ignored");
                    Fulfillment::Duplicate
                }
            });
        }

        if let Some(plan) = catalog::find_plan(code) {
            return Ok(match self.subscriptions.activate_paid(payment_id, account_id, plan).await? {
                PlanActivation::Activated(sub) => Fulfillment::PlanActivated(sub),
                PlanActivation::Duplicate => Fulfillment::Duplicate,
            });
        }

        // Order rows only ever hold catalog codes, so this is a data bug.
        anyhow::bail!("order {payment_id} references unknown catalog code {code}")
    }

    /// Balances for display, via the TTL cache. Falls back to a short bounded
    /// retry on read failure; debit paths read the ledger directly instead.
    pub async fn display_balances(&self, account_id: i64) -> Result<Option<Account>> {
        if let Some(account) = self.balance_cache.get(account_id) {
            return Ok(Some(account));
        }

        let mut last_err = None;
        for attempt in 0..3u32 {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
            }
            match self.ledger.get_account(account_id).await {
                Ok(Some(account)) => {
                    self.balance_cache.put(account.clone());
                    return Ok(Some(account));
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(account_id, attempt, "balance read failed: {e:#}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("balance read failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let p = PaymentPayload::pack(777, "pack_chatgpt");
        assert_eq!(p.encode(), "777:pack:pack_chatgpt");
        assert_eq!(PaymentPayload::decode("777:pack:pack_chatgpt").unwrap(), p);

        let p = PaymentPayload::plan(42, "chat_expert");
        assert_eq!(p.encode(), "42:plan:chat_expert");
        assert_eq!(PaymentPayload::decode("42:plan:chat_expert").unwrap(), p);
    }

    #[test]
    fn payload_rejects_malformed() {
        assert!(matches!(
            PaymentPayload::decode("not-a-payload"),
            Err(PayloadError::InvalidPayload(_))
        ));
        assert!(matches!(
            PaymentPayload::decode("abc:pack:pack_chatgpt"),
            Err(PayloadError::InvalidPayload(_))
        ));
        assert!(matches!(
            PaymentPayload::decode("42:gift:pack_chatgpt"),
            Err(PayloadError::InvalidPayload(_))
        ));
        assert!(matches!(
            PaymentPayload::decode("42:pack:"),
            Err(PayloadError::InvalidPayload(_))
        ));
        // Well-formed but unknown code.
        assert!(matches!(
            PaymentPayload::decode("42:plan:chat_mega"),
            Err(PayloadError::UnknownItem(_))
        ));
    }

    #[test]
    fn webhook_body_validation() {
        let paid = r#"{"update_type":"invoice_paid","payload":{"invoice_id":555,"status":"paid"}}"#;
        assert_eq!(
            parse_webhook_body(paid).unwrap(),
            WebhookEvent::InvoicePaid { invoice_id: 555 }
        );

        let other = r#"{"update_type":"invoice_expired","payload":{"invoice_id":555}}"#;
        assert_eq!(parse_webhook_body(other).unwrap(), WebhookEvent::Ignored);

        let missing_id = r#"{"update_type":"invoice_paid","payload":{"status":"paid"}}"#;
        assert!(matches!(
            parse_webhook_body(missing_id),
            Err(PayloadError::MalformedBody(_))
        ));

        assert!(matches!(
            parse_webhook_body("{not json"),
            Err(PayloadError::MalformedBody(_))
        ));
    }

    fn account(id: i64, chatgpt: i32) -> Account {
        Account {
            id,
            chatgpt,
            dalle: 3,
            stable: 3,
            midjourney: 3,
            referrer_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn balance_cache_serves_within_ttl_and_drops_on_invalidate() {
        let cache = BalanceCache::new(Duration::from_secs(60));
        assert!(cache.get(1).is_none());

        cache.put(account(1, 3000));
        assert_eq!(cache.get(1).map(|a| a.chatgpt), Some(3000));

        // A credit elsewhere (pack, referral bonus) must drop the entry so
        // the next profile read sees the ledger, not the snapshot.
        cache.invalidate(1);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn balance_cache_expires_entries() {
        let cache = BalanceCache::new(Duration::ZERO);
        cache.put(account(2, 100));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn stars_currency_check() {
        assert!(validate_stars_currency("XTR").is_ok());
        assert!(matches!(
            validate_stars_currency("USD"),
            Err(PayloadError::WrongCurrency(_))
        ));
    }
}
