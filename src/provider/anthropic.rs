use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::provider::http::{HttpTransport, TEST_TIMEOUT, join_url};
use crate::provider::prompts::{self, PromptStyle};
use crate::provider::{ChatProvider, Provider, ProviderSettings, SettingsCell};
use crate::types::{
    ChatCompletion, ChatMessage, EnhancementOptions, EnhancementResult, ProviderName, Role,
    Suggestion,
};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f64 = 0.3;

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        let joined = self
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        prompts::clean_output(&joined)
    }

    fn total_tokens(&self) -> Option<u64> {
        let usage = self.usage.as_ref()?;
        match (usage.input_tokens, usage.output_tokens) {
            (None, None) => None,
            (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
        }
    }
}

/// Split a conversation into Anthropic's `system` field and alternating turns.
///
/// System-role messages are joined into the system prompt; leading assistant
/// turns are dropped because the API requires the first turn to be the user's.
fn split_conversation(messages: &[ChatMessage]) -> (String, Vec<serde_json::Value>) {
    let mut system = String::new();
    let mut turns = Vec::new();
    for m in messages {
        match m.role {
            Role::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&m.content);
            }
            Role::Assistant if turns.is_empty() => {}
            Role::User | Role::Assistant => {
                turns.push(json!({"role": m.role.as_str(), "content": m.content}));
            }
        }
    }
    (system, turns)
}

/// Anthropic Messages API. One completion per call.
pub struct AnthropicProvider {
    settings: SettingsCell,
    http: HttpTransport,
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            settings: SettingsCell::new(ProviderName::Anthropic),
            http: HttpTransport::new(),
        }
    }

    fn require_key(&self) -> Result<ProviderSettings, ProviderError> {
        let settings = self.settings.snapshot();
        if settings.api_key.is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: ProviderName::Anthropic.to_string(),
            });
        }
        Ok(settings)
    }

    fn headers(settings: &ProviderSettings) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", settings.api_key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
        ]
    }

    async fn send(
        &self,
        settings: &ProviderSettings,
        body: &serde_json::Value,
        timeout: Option<std::time::Duration>,
    ) -> Result<MessagesResponse, ProviderError> {
        self.http
            .post_json(
                "anthropic",
                &join_url(&settings.base_url, "/messages"),
                &Self::headers(settings),
                body,
                timeout,
            )
            .await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Anthropic
    }

    fn configure(&self, api_key: &str, model: Option<&str>, base_url: Option<&str>) {
        self.settings.configure(api_key, model, base_url);
    }

    fn is_configured(&self) -> bool {
        self.settings.has_key()
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let settings = self.require_key()?;
        let body = json!({
            "model": settings.model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        });
        self.send(&settings, &body, Some(TEST_TIMEOUT)).await?;
        Ok(())
    }

    async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, ProviderError> {
        let start = Instant::now();
        let settings = self.require_key()?;

        let body = json!({
            "model": settings.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": prompts::system_prompt(PromptStyle::Detailed, options),
            "messages": [{"role": "user", "content": prompts::user_prompt(text)}],
        });

        let response = self.send(&settings, &body, None).await?;
        let output = response.text();
        if output.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderName::Anthropic.to_string(),
            });
        }

        Ok(EnhancementResult {
            original: text.to_string(),
            suggestions: vec![Suggestion::ranked(output, &options.kind, 0)],
            provider: ProviderName::Anthropic.to_string(),
            tokens_used: response.total_tokens(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn enhance_chat(
        &self,
        messages: &[ChatMessage],
        _options: &EnhancementOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        let settings = self.require_key()?;
        let (system, turns) = split_conversation(messages);
        if turns.is_empty() {
            return Err(ProviderError::Other(
                "anthropic: conversation has no user message".to_string(),
            ));
        }

        let body = json!({
            "model": settings.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": system,
            "messages": turns,
        });

        let response = self.send(&settings, &body, None).await?;
        let text = response.text();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderName::Anthropic.to_string(),
            });
        }

        Ok(ChatCompletion {
            text,
            tokens_used: response.total_tokens(),
            finish_reason: response.stop_reason,
        })
    }
}
