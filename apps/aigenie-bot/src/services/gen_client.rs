use aigenie_db::models::Product;
use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;

/// Thin client for an OpenAI-compatible generation backend. The engine only
/// cares about the success/failure signal; provider behavior stays out here.
#[derive(Clone)]
pub struct GenClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GenClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }

    pub async fn chat(&self, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": prompt}],
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("Chat request failed: {}", resp.status()));
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no choices"))
    }

    /// Returns the URL of the generated image.
    pub async fn image(&self, product: Product, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct ImageResponse {
            data: Vec<ImageDatum>,
        }
        #[derive(Deserialize)]
        struct ImageDatum {
            url: String,
        }

        let model = match product {
            Product::DallE => "dall-e-3",
            Product::StableDiffusion => "stable-diffusion-xl",
            Product::MidJourney => "midjourney",
            Product::ChatGpt => return Err(anyhow::anyhow!("not an image product")),
        };

        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "n": 1,
        });
        let resp = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("Image request failed: {}", resp.status()));
        }

        let parsed: ImageResponse = resp.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.url)
            .ok_or_else(|| anyhow::anyhow!("Image response contained no data"))
    }
}
