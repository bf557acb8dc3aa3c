use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    /// Crypto Pay API token (also keys the webhook signature check).
    pub cryptopay_token: String,
    pub cryptopay_api_url: String,
    /// OpenAI-compatible endpoint for text generation.
    pub gen_api_url: String,
    pub gen_api_key: String,
    pub webhook_listen_addr: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            bot_token: env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            cryptopay_token: env::var("CRYPTOPAY_TOKEN").context("CRYPTOPAY_TOKEN is not set")?,
            cryptopay_api_url: env::var("CRYPTOPAY_API_URL")
                .unwrap_or_else(|_| "https://pay.crypt.bot/api".to_string()),
            gen_api_url: env::var("GEN_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            gen_api_key: env::var("GEN_API_KEY").unwrap_or_default(),
            webhook_listen_addr: env::var("WEBHOOK_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}
