//! Text-generation provider abstraction and implementations.
//!
//! - **[`GeminiClient`]**: Google Generative Language REST API,
//!   `POST /v1beta/models/{model}:generateContent`.
//! - **[`OpenAiClient`]**: any OpenAI-compatible `POST /v1/chat/completions`.
//! - **[`DisabledLlm`]**: fails every call; useful for ingest-only setups.
//!
//! Each call is made once with the configured timeout. Failures are
//! returned to the generator, which records the batch as failed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

/// Sends one prompt and returns the model's raw text reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the client selected by `[llm].provider`.
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledLlm)),
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

fn api_key(config: &LlmConfig) -> Result<String> {
    std::env::var(&config.api_key_env)
        .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn post_json(
    service: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} connection error", service))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", service, status, body);
    }
    Ok(response.json().await?)
}

// ============ Gemini ============

pub struct GeminiClient {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key: api_key(config)?,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            self.url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        let request = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let json = post_json("Gemini", request).await?;
        parse_gemini_response(&json)
    }
}

/// Concatenate `candidates[0].content.parts[].text`.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: no candidate content"))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect())
}

// ============ OpenAI-compatible ============

pub struct OpenAiClient {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: api_key(config)?,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let endpoint = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let request = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = post_json("OpenAI", request).await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}
