use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::provider::http::{HttpTransport, TEST_TIMEOUT, join_url};
use crate::provider::openai::wire_messages;
use crate::provider::prompts::{self, PromptStyle};
use crate::provider::{ChatProvider, Provider, ProviderSettings, SettingsCell};
use crate::types::{
    ChatCompletion, ChatMessage, EnhancementOptions, EnhancementResult, ProviderName, Suggestion,
};

const TEMPERATURE: f64 = 0.3;

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<OllamaMessage>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl ChatResponse {
    fn text(&self) -> String {
        self.message
            .as_ref()
            .map(|m| prompts::clean_output(&m.content))
            .unwrap_or_default()
    }

    fn total_tokens(&self) -> Option<u64> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        }
    }
}

/// Local Ollama server. No credential; always considered configured.
pub struct OllamaProvider {
    settings: SettingsCell,
    http: HttpTransport,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self {
            settings: SettingsCell::new(ProviderName::Ollama),
            http: HttpTransport::new(),
        }
    }

    async fn chat(
        &self,
        settings: &ProviderSettings,
        messages: Vec<serde_json::Value>,
    ) -> Result<ChatResponse, ProviderError> {
        let body = json!({
            "model": settings.model,
            "messages": messages,
            "stream": false,
            "options": {"temperature": TEMPERATURE},
        });
        self.http
            .post_json(
                "ollama",
                &join_url(&settings.base_url, "/api/chat"),
                &[],
                &body,
                None,
            )
            .await
            .map_err(|e| unreachable_hint(e, &settings.base_url))
    }
}

/// Connection failures against a local service almost always mean it is not running.
fn unreachable_hint(err: ProviderError, base_url: &str) -> ProviderError {
    match err {
        ProviderError::Request(e) if e.is_connect() => ProviderError::Upstream {
            provider: ProviderName::Ollama.to_string(),
            message: format!("local service not reachable at {base_url}: {e}"),
            status: None,
        },
        other => other,
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Ollama
    }

    fn configure(&self, _api_key: &str, model: Option<&str>, base_url: Option<&str>) {
        self.settings.configure("", model, base_url);
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let settings = self.settings.snapshot();
        let _: serde_json::Value = self
            .http
            .get_json(
                "ollama",
                &join_url(&settings.base_url, "/api/tags"),
                &[],
                Some(TEST_TIMEOUT),
            )
            .await
            .map_err(|e| unreachable_hint(e, &settings.base_url))?;
        Ok(())
    }

    async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, ProviderError> {
        let start = Instant::now();
        let settings = self.settings.snapshot();
        let messages = vec![
            json!({"role": "system", "content": prompts::system_prompt(PromptStyle::Compact, options)}),
            json!({"role": "user", "content": prompts::user_prompt(text)}),
        ];

        let response = self.chat(&settings, messages).await?;
        let output = response.text();
        if output.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderName::Ollama.to_string(),
            });
        }

        Ok(EnhancementResult {
            original: text.to_string(),
            suggestions: vec![Suggestion::ranked(output, &options.kind, 0)],
            provider: ProviderName::Ollama.to_string(),
            tokens_used: response.total_tokens(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn enhance_chat(
        &self,
        messages: &[ChatMessage],
        _options: &EnhancementOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        let settings = self.settings.snapshot();
        let wire = wire_messages(messages);
        let response = self.chat(&settings, wire).await?;
        let text = response.text();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderName::Ollama.to_string(),
            });
        }
        Ok(ChatCompletion {
            text,
            tokens_used: response.total_tokens(),
            finish_reason: response.done_reason,
        })
    }
}
