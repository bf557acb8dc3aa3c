use std::io;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod bot;
mod catalog;
mod config;
mod services;
mod state;

use crate::config::Config;
use crate::services::entitlement_service::EntitlementService;
use crate::services::gen_client::GenClient;
use crate::services::pay_service::{BalanceCache, PayService};
use crate::services::referral_service::ReferralService;
use crate::services::subscription_service::SubscriptionService;
pub use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let file_appender = tracing_appender::rolling::never(".", "aigenie.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aigenie_bot=debug,aigenie_db=debug,axum=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let config = Config::load()?;
    info!("Starting aigenie bot...");

    let pool = aigenie_db::connect(&config.database_url).await?;

    // One cache instance: every crediting path invalidates through it.
    let balance_cache = BalanceCache::new(std::time::Duration::from_secs(60));

    let state = AppState {
        pool: pool.clone(),
        entitlement_service: EntitlementService::new(pool.clone()),
        pay_service: PayService::new(pool.clone(), &config, balance_cache.clone()),
        subscription_service: SubscriptionService::new(pool.clone()),
        referral_service: ReferralService::new(pool, balance_cache),
        gen_client: GenClient::new(config.gen_api_url.clone(), config.gen_api_key.clone()),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let app = api::webhooks::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.webhook_listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.webhook_listen_addr))?;
    info!("Webhook server listening on {}", config.webhook_listen_addr);

    let telegram_bot = Bot::new(config.bot_token.clone());

    tokio::select! {
        res = axum::serve(listener, app) => {
            res.context("Webhook server exited")?;
        }
        _ = bot::run_bot(telegram_bot, shutdown_rx, state) => {
            info!("Bot loop exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    }

    Ok(())
}
