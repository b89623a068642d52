use schemars::JsonSchema;
use serde::Deserialize;

use crate::tools::enums::ProviderChoice;
use crate::types::ProviderUpdate;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProviderNameRequest {
    /// Backend to act on.
    pub name: ProviderChoice,
}

#[derive(Deserialize, JsonSchema)]
pub struct SaveProviderRequest {
    /// Backend to update. Fields left out keep their saved values.
    pub name: ProviderChoice,
    /// API key. Not needed for ollama. Pass "" to clear.
    pub api_key: Option<String>,
    /// Model identifier, e.g. "gpt-4o-mini" or "llama3.2".
    pub model: Option<String>,
    /// Whether the backend takes part in fallback.
    pub enabled: Option<bool>,
    /// Fallback order, lowest first. Must be at least 1.
    pub priority: Option<u32>,
    /// Override the API base URL. Pass "" to restore the default.
    pub base_url: Option<String>,
}

impl SaveProviderRequest {
    pub fn update(&self) -> ProviderUpdate {
        ProviderUpdate {
            api_key: self.api_key.as_ref().map(|k| k.trim().to_string()),
            model: self.model.as_ref().map(|m| m.trim().to_string()),
            enabled: self.enabled,
            priority: self.priority,
            base_url: self.base_url.as_ref().map(|u| u.trim().to_string()),
        }
    }
}

impl std::fmt::Debug for SaveProviderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveProviderRequest")
            .field("name", &self.name)
            .field("update", &self.update())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_key() {
        let req: SaveProviderRequest = serde_json::from_str(
            r#"{"name":"openai","api_key":" sk-secret-value ","priority":2}"#,
        )
        .unwrap();
        assert_eq!(req.update().api_key.as_deref(), Some("sk-secret-value"));
        assert!(!format!("{req:?}").contains("secret"));
    }
}
