use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{ConfigError, EvalError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// External LLM collaborator: an opaque system prompt plus the delimited
/// article payload in, raw text (expected to be fenced or bare JSON) out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn request(&self, prompt: &str, content: &str) -> Result<String, EvalError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint, configured
/// from `GPT_API_KEY` / `AI_PROVIDER` / `GPT_MODEL_NAME`.
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GPT_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential("GPT_API_KEY".to_string()))?;

        let provider = std::env::var("AI_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string())
            .to_lowercase();
        let base_url = match provider.as_str() {
            "openai" => "https://api.openai.com/v1",
            "deepseek" => "https://api.deepseek.com/v1",
            "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown AI_PROVIDER '{other}' (expected openai, deepseek, or gemini)"
                )));
            }
        }
        .to_string();

        let model = std::env::var("GPT_MODEL_NAME")
            .ok()
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Validation(format!("failed to build HTTP client: {e}")))?;

        info!(provider = %provider, model = %model, "LLM provider configured");
        Ok(Self {
            http,
            api_key,
            model,
            base_url,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn request(&self, prompt: &str, content: &str) -> Result<String, EvalError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt},
                {"role": "user", "content": content},
            ],
            "temperature": 0.3,
        });

        debug!(model = %self.model, bytes = content.len(), "LLM request");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EvalError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(EvalError::Request(format!("status {status}: {snippet}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EvalError::Request(e.to_string()))?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EvalError::Parse("response had no choices[0].message.content".to_string()))
    }
}
