use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Default number of suggestions requested from backends that can return several.
pub const DEFAULT_VARIANTS: usize = 2;

/// Upper bound on suggestions per request, regardless of what the caller asks for.
pub const MAX_VARIANTS: usize = 3;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The closed set of backends textlift knows how to talk to.
///
/// Registration order (and the default priority order) is the order of [`ProviderName::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    OpenAi,
    Anthropic,
    OpenRouter,
    Ollama,
}

impl ProviderName {
    pub const ALL: [ProviderName; 4] = [
        ProviderName::OpenAi,
        ProviderName::Anthropic,
        ProviderName::OpenRouter,
        ProviderName::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    /// The local inference backend runs without a credential.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Ollama)
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenRouter => "openai/gpt-4o-mini",
            Self::Ollama => "llama3.2",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Human-facing label used in aggregated error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::OpenRouter => "OpenRouter",
            Self::Ollama => "Ollama",
        }
    }

    /// Default priority: 1-based position in the canonical list.
    pub fn default_priority(&self) -> u32 {
        Self::ALL
            .iter()
            .position(|n| n == self)
            .map(|i| i as u32 + 1)
            .unwrap_or(u32::MAX)
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!(
                "unknown provider: {other} (expected one of openai, anthropic, openrouter, ollama)"
            )),
        }
    }
}

/// Persisted per-backend configuration.
///
/// `name` is kept as a string so descriptors for backends this build no longer
/// knows survive a load/save cycle; the registry ignores them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub enabled: bool,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderDescriptor {
    /// Backend defaults: canonical priority, default model, disabled, no key.
    pub fn defaults_for(name: ProviderName) -> Self {
        Self {
            name: name.as_str().to_string(),
            api_key: String::new(),
            model: name.default_model().to_string(),
            enabled: false,
            priority: name.default_priority(),
            base_url: None,
        }
    }

    pub fn provider_name(&self) -> Option<ProviderName> {
        self.name.parse().ok()
    }

    pub fn is_local(&self) -> bool {
        self.provider_name().is_some_and(|n| n.is_local())
    }

    /// Enabled, and either local or carrying a non-empty credential.
    pub fn is_eligible(&self) -> bool {
        self.enabled && (self.is_local() || !self.api_key.trim().is_empty())
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &ProviderUpdate) {
        if let Some(ref key) = update.api_key {
            self.api_key = key.clone();
        }
        if let Some(ref model) = update.model {
            self.model = model.clone();
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(ref base_url) = update.base_url {
            self.base_url = if base_url.trim().is_empty() {
                None
            } else {
                Some(base_url.clone())
            };
        }
    }

    /// Copy with the credential replaced by a short mask, for display.
    pub fn masked(&self) -> Self {
        Self {
            api_key: mask_key(&self.api_key),
            ..self.clone()
        }
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Show only the last four characters of a credential.
pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count == 0 {
        return String::new();
    }
    if count <= 8 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("****{tail}")
}

/// Partial update accepted by the configuration boundary.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<u32>,
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderUpdate")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Kind of rewrite requested.
///
/// Unknown strings are preserved in `Other`; adapters treat them as `Rephrase`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnhancementType {
    Grammar,
    #[default]
    Rephrase,
    Formal,
    Casual,
    Concise,
    Expand,
    Other(String),
}

impl EnhancementType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Grammar => "grammar",
            Self::Rephrase => "rephrase",
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Concise => "concise",
            Self::Expand => "expand",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for EnhancementType {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "grammar" => Self::Grammar,
            "rephrase" => Self::Rephrase,
            "formal" => Self::Formal,
            "casual" => Self::Casual,
            "concise" => Self::Concise,
            "expand" => Self::Expand,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for EnhancementType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<EnhancementType> for String {
    fn from(t: EnhancementType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for EnhancementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementOptions {
    #[serde(rename = "type", default)]
    pub kind: EnhancementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_variants: Option<u8>,
}

impl EnhancementOptions {
    pub fn new(kind: impl Into<EnhancementType>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Requested variant count, defaulted and clamped to `1..=MAX_VARIANTS`.
    pub fn variants(&self) -> usize {
        self.max_variants
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_VARIANTS)
            .clamp(1, MAX_VARIANTS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: EnhancementType,
    pub confidence: f32,
    /// Reserved for diff annotation; never populated today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
}

impl Suggestion {
    /// Build the `index`-th variant from one backend response.
    /// Later variants get lower confidence.
    pub fn ranked(text: impl Into<String>, kind: &EnhancementType, index: usize) -> Self {
        let confidence = (0.9 - 0.1 * index as f32).max(0.5);
        Self {
            text: text.into(),
            kind: kind.clone(),
            confidence,
            changes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResult {
    pub original: String,
    pub suggestions: Vec<Suggestion>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(now_ms()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Raw reply from a backend's native multi-turn chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub text: String,
    pub tokens_used: Option<u64>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub text: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u64,
}
