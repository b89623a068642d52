use schemars::JsonSchema;
use serde::Deserialize;

use crate::tools::enhance::options_from;
use crate::tools::enums::TurnRole;
use crate::types::{ChatMessage, EnhancementOptions};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChatRequest {
    /// Conversation so far, oldest first. The last user turn is what gets rewritten;
    /// older turns are trimmed when the history is long.
    pub messages: Vec<ChatTurn>,
    /// Rewrite style: "grammar", "rephrase" (default), "formal", "casual", "concise", "expand".
    pub enhancement_type: Option<String>,
    /// Target language for the reply.
    pub language: Option<String>,
    /// Extra context about where the text will be used.
    pub context: Option<String>,
}

impl ChatRequest {
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|t| ChatMessage::new(t.role.into(), t.content.clone()))
            .collect()
    }

    pub fn options(&self) -> EnhancementOptions {
        options_from(
            self.enhancement_type.as_deref(),
            self.language.as_deref(),
            self.context.as_deref(),
            None,
        )
    }
}
