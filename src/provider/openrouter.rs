use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use crate::error::ProviderError;
use crate::provider::http::{HttpTransport, TEST_TIMEOUT, join_url};
use crate::provider::openai::{ChatCompletionResponse, into_chat, into_result, wire_messages};
use crate::provider::prompts::{self, PromptStyle};
use crate::provider::{ChatProvider, Provider, ProviderSettings, SettingsCell};
use crate::types::{ChatCompletion, ChatMessage, EnhancementOptions, EnhancementResult, ProviderName};

const TEMPERATURE: f64 = 0.3;
const APP_REFERER: &str = "https://github.com/textlift/textlift";
const APP_TITLE: &str = "textlift";

/// OpenRouter aggregator. OpenAI-compatible wire format, single choice per call.
pub struct OpenRouterProvider {
    settings: SettingsCell,
    http: HttpTransport,
}

impl Default for OpenRouterProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenRouterProvider {
    pub fn new() -> Self {
        Self {
            settings: SettingsCell::new(ProviderName::OpenRouter),
            http: HttpTransport::new(),
        }
    }

    fn require_key(&self) -> Result<ProviderSettings, ProviderError> {
        let settings = self.settings.snapshot();
        if settings.api_key.is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: ProviderName::OpenRouter.to_string(),
            });
        }
        Ok(settings)
    }

    fn headers(settings: &ProviderSettings) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("Bearer {}", settings.api_key)),
            ("HTTP-Referer", APP_REFERER.to_string()),
            ("X-Title", APP_TITLE.to_string()),
        ]
    }

    async fn complete(
        &self,
        settings: &ProviderSettings,
        messages: Vec<serde_json::Value>,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let body = json!({
            "model": settings.model,
            "messages": messages,
            "temperature": TEMPERATURE,
        });
        self.http
            .post_json(
                "openrouter",
                &join_url(&settings.base_url, "/chat/completions"),
                &Self::headers(settings),
                &body,
                None,
            )
            .await
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> ProviderName {
        ProviderName::OpenRouter
    }

    fn configure(&self, api_key: &str, model: Option<&str>, base_url: Option<&str>) {
        self.settings.configure(api_key, model, base_url);
    }

    fn is_configured(&self) -> bool {
        self.settings.has_key()
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let settings = self.require_key()?;
        // /auth/key validates the credential without spending tokens.
        let _: serde_json::Value = self
            .http
            .get_json(
                "openrouter",
                &join_url(&settings.base_url, "/auth/key"),
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
        let messages = vec![
            json!({"role": "system", "content": prompts::system_prompt(PromptStyle::Detailed, options)}),
            json!({"role": "user", "content": prompts::user_prompt(text)}),
        ];
        let response = self.complete(&settings, messages).await?;
        into_result(ProviderName::OpenRouter, text, options, response, start)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    async fn enhance_chat(
        &self,
        messages: &[ChatMessage],
        _options: &EnhancementOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        let settings = self.require_key()?;
        let wire = wire_messages(messages);
        let response = self.complete(&settings, wire).await?;
        into_chat(ProviderName::OpenRouter, response)
    }
}
