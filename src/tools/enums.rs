use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{ProviderName, Role};

/// Backend selector for the configuration tools.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    #[serde(alias = "open_ai")]
    Openai,
    #[serde(alias = "claude")]
    Anthropic,
    Openrouter,
    /// Local inference server; no API key needed.
    Ollama,
}

impl ProviderChoice {
    pub fn as_str(&self) -> &'static str {
        self.provider_name().as_str()
    }

    pub fn provider_name(&self) -> ProviderName {
        match self {
            Self::Openai => ProviderName::OpenAi,
            Self::Anthropic => ProviderName::Anthropic,
            Self::Openrouter => ProviderName::OpenRouter,
            Self::Ollama => ProviderName::Ollama,
        }
    }
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    /// Accepted but replaced by the server's own system prompt.
    System,
}

impl From<TurnRole> for Role {
    fn from(r: TurnRole) -> Self {
        match r {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
            TurnRole::System => Role::System,
        }
    }
}
