use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::provider::http::{HttpTransport, TEST_TIMEOUT, join_url};
use crate::provider::prompts::{self, PromptStyle};
use crate::provider::{ChatProvider, Provider, ProviderSettings, SettingsCell};
use crate::types::{
    ChatCompletion, ChatMessage, EnhancementOptions, EnhancementResult, ProviderName, Suggestion,
};

const TEMPERATURE: f64 = 0.3;

// OpenAI-compatible chat completion wire types, shared with OpenRouter.

#[derive(Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Message {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
    pub total_tokens: Option<u64>,
}

impl ChatCompletionResponse {
    /// Non-empty cleaned choice texts, in order.
    pub fn texts(&self) -> Vec<String> {
        self.choices
            .iter()
            .filter_map(|c| c.message.content.as_deref())
            .map(prompts::clean_output)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn total_tokens(&self) -> Option<u64> {
        self.usage.as_ref().and_then(|u| u.total_tokens)
    }
}

/// Conversation as OpenAI-style role/content objects. The system prompt is
/// expected to already be the first message.
pub(crate) fn wire_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect()
}

/// Map an OpenAI-style response onto suggestions.
pub(crate) fn into_result(
    provider: ProviderName,
    text: &str,
    options: &EnhancementOptions,
    response: ChatCompletionResponse,
    start: Instant,
) -> Result<EnhancementResult, ProviderError> {
    let texts = response.texts();
    if texts.is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider: provider.to_string(),
        });
    }

    let mut seen = Vec::new();
    let suggestions = texts
        .into_iter()
        .filter(|t| {
            if seen.contains(t) {
                false
            } else {
                seen.push(t.clone());
                true
            }
        })
        .take(options.variants())
        .enumerate()
        .map(|(i, t)| Suggestion::ranked(t, &options.kind, i))
        .collect();

    Ok(EnhancementResult {
        original: text.to_string(),
        suggestions,
        provider: provider.to_string(),
        tokens_used: response.total_tokens(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    })
}

pub(crate) fn into_chat(
    provider: ProviderName,
    response: ChatCompletionResponse,
) -> Result<ChatCompletion, ProviderError> {
    let tokens_used = response.total_tokens();
    let first = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::EmptyResponse {
            provider: provider.to_string(),
        })?;
    let text = first
        .message
        .content
        .as_deref()
        .map(prompts::clean_output)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::EmptyResponse {
            provider: provider.to_string(),
        })?;

    Ok(ChatCompletion {
        text,
        tokens_used,
        finish_reason: first.finish_reason,
    })
}

/// OpenAI chat completions. Asks for several choices per call.
pub struct OpenAiProvider {
    settings: SettingsCell,
    http: HttpTransport,
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self {
            settings: SettingsCell::new(ProviderName::OpenAi),
            http: HttpTransport::new(),
        }
    }

    fn require_key(&self) -> Result<ProviderSettings, ProviderError> {
        let settings = self.settings.snapshot();
        if settings.api_key.is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: ProviderName::OpenAi.to_string(),
            });
        }
        Ok(settings)
    }

    fn headers(settings: &ProviderSettings) -> Vec<(&'static str, String)> {
        vec![("Authorization", format!("Bearer {}", settings.api_key))]
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> ProviderName {
        ProviderName::OpenAi
    }

    fn configure(&self, api_key: &str, model: Option<&str>, base_url: Option<&str>) {
        self.settings.configure(api_key, model, base_url);
    }

    fn is_configured(&self) -> bool {
        self.settings.has_key()
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let settings = self.require_key()?;
        let _: serde_json::Value = self
            .http
            .get_json(
                "openai",
                &join_url(&settings.base_url, "/models"),
                &Self::headers(&settings),
                Some(TEST_TIMEOUT),
            )
            .await?;
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
            "messages": [
                {"role": "system", "content": prompts::system_prompt(PromptStyle::Detailed, options)},
                {"role": "user", "content": prompts::user_prompt(text)},
            ],
            "n": options.variants(),
            "temperature": TEMPERATURE,
        });

        let response: ChatCompletionResponse = self
            .http
            .post_json(
                "openai",
                &join_url(&settings.base_url, "/chat/completions"),
                &Self::headers(&settings),
                &body,
                None,
            )
            .await?;

        into_result(ProviderName::OpenAi, text, options, response, start)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn enhance_chat(
        &self,
        messages: &[ChatMessage],
        _options: &EnhancementOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        let settings = self.require_key()?;

        let body = json!({
            "model": settings.model,
            "messages": wire_messages(messages),
            "temperature": TEMPERATURE,
        });

        let response: ChatCompletionResponse = self
            .http
            .post_json(
                "openai",
                &join_url(&settings.base_url, "/chat/completions"),
                &Self::headers(&settings),
                &body,
                None,
            )
            .await?;

        into_chat(ProviderName::OpenAi, response)
    }
}
