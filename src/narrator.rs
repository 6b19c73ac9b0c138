//! Short facts about a place from an OpenAI-compatible chat-completion API.

use std::future::Future;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::types::{ChatMessage, ChatRequest, ChatResponse, Fact};

pub const OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 150;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant who gives interesting facts about cities and countries.";

pub trait FactNarrator: Send + Sync {
    fn narrate(&self, country: &str, city: &str) -> impl Future<Output = Result<Fact>> + Send;
}

pub fn fact_prompt(country: &str, city: &str) -> String {
    format!("Give me an interesting, short fact about {}, {}.", city, country)
}

/// Single-turn request asking for a fact about `city, country`
pub fn fact_request(model: &str, country: &str, city: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(fact_prompt(country, city)),
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    }
}

/// Take the first choice's text as the fact
pub fn extract_fact(response: ChatResponse) -> Result<Fact> {
    let text = response
        .choices
        .into_iter()
        .next()
        .context("Completion returned no choices")?
        .message
        .content
        .context("Completion choice has no content")?;

    Ok(Fact { text })
}

#[derive(Debug, Clone)]
pub struct OpenAiNarrator {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiNarrator {
    pub fn new(
        http_client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }
}

impl FactNarrator for OpenAiNarrator {
    async fn narrate(&self, country: &str, city: &str) -> Result<Fact> {
        let api_key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not set")?;

        let url = format!("{}/chat/completions", self.base_url);
        let request = fact_request(&self.model, country, city);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error: {} {}", status, body);
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        let fact = extract_fact(completion)?;
        debug!("Fact about {}, {}: {}", city, country, fact.text);
        Ok(fact)
    }
}
