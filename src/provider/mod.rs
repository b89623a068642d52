pub mod anthropic;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod openrouter;
pub mod prompts;

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{
    ChatCompletion, ChatMessage, EnhancementOptions, EnhancementResult, ProviderName,
};

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

/// Uniform contract every backend adapter satisfies.
///
/// Adapters are shared for the life of the process and reconfigured in place,
/// so `configure` takes `&self`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Store credentials. `None` keeps the current model / endpoint.
    fn configure(&self, api_key: &str, model: Option<&str>, base_url: Option<&str>);

    fn is_configured(&self) -> bool;

    /// Lightweight round-trip for user-initiated diagnostics.
    async fn test_connection(&self) -> Result<(), ProviderError>;

    async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, ProviderError>;
}

/// Backends with native multi-turn chat.
#[async_trait]
pub trait ChatProvider: Provider {
    async fn enhance_chat(
        &self,
        messages: &[ChatMessage],
        options: &EnhancementOptions,
    ) -> Result<ChatCompletion, ProviderError>;
}

/// An adapter together with its capability, fixed at registration.
#[derive(Clone)]
pub enum Adapter {
    Completion(Arc<dyn Provider>),
    Chat(Arc<dyn ChatProvider>),
}

impl Adapter {
    pub fn name(&self) -> ProviderName {
        match self {
            Self::Completion(p) => p.name(),
            Self::Chat(p) => p.name(),
        }
    }

    pub fn configure(&self, api_key: &str, model: Option<&str>, base_url: Option<&str>) {
        match self {
            Self::Completion(p) => p.configure(api_key, model, base_url),
            Self::Chat(p) => p.configure(api_key, model, base_url),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self {
            Self::Completion(p) => p.is_configured(),
            Self::Chat(p) => p.is_configured(),
        }
    }

    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match self {
            Self::Completion(p) => p.test_connection().await,
            Self::Chat(p) => p.test_connection().await,
        }
    }

    pub async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, ProviderError> {
        match self {
            Self::Completion(p) => p.enhance(text, options).await,
            Self::Chat(p) => p.enhance(text, options).await,
        }
    }

    /// The chat capability, if this backend has one.
    pub fn as_chat(&self) -> Option<&Arc<dyn ChatProvider>> {
        match self {
            Self::Completion(_) => None,
            Self::Chat(p) => Some(p),
        }
    }

    pub fn supports_chat(&self) -> bool {
        self.as_chat().is_some()
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name())
            .field("chat", &self.supports_chat())
            .finish()
    }
}

/// Credentials and endpoint an adapter currently uses.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Interior-mutable settings slot.
///
/// Calls take a [`snapshot`](SettingsCell::snapshot) up front so a concurrent
/// `configure` from another request never changes settings mid-call.
pub struct SettingsCell {
    inner: RwLock<ProviderSettings>,
}

impl SettingsCell {
    pub fn new(name: ProviderName) -> Self {
        Self {
            inner: RwLock::new(ProviderSettings {
                api_key: String::new(),
                model: name.default_model().to_string(),
                base_url: name.default_base_url().to_string(),
            }),
        }
    }

    pub fn configure(&self, api_key: &str, model: Option<&str>, base_url: Option<&str>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.api_key = api_key.trim().to_string();
        if let Some(m) = model.map(str::trim).filter(|m| !m.is_empty()) {
            guard.model = m.to_string();
        }
        if let Some(url) = base_url.map(str::trim).filter(|u| !u.is_empty()) {
            guard.base_url = url.to_string();
        }
    }

    pub fn snapshot(&self) -> ProviderSettings {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn has_key(&self) -> bool {
        !self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .api_key
            .is_empty()
    }
}

/// Build one adapter per known backend, in canonical order.
pub fn default_adapters() -> Vec<Adapter> {
    vec![
        Adapter::Chat(Arc::new(OpenAiProvider::new())),
        Adapter::Chat(Arc::new(AnthropicProvider::new())),
        Adapter::Chat(Arc::new(OpenRouterProvider::new())),
        Adapter::Chat(Arc::new(OllamaProvider::new())),
    ]
}
