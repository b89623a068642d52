//! Conversation preparation for the chat path: system prompt plus history
//! trimmed to a character budget.

use crate::provider::prompts;
use crate::types::{ChatMessage, EnhancementOptions, Role};

/// Default character budget for conversation history.
pub const DEFAULT_CONTEXT_CHARS: usize = 12_000;

/// Keep the most recent messages whose combined content fits in `budget_chars`.
///
/// The newest message is always kept even if it alone exceeds the budget.
/// Existing system messages are dropped; [`prepare_conversation`] supplies its own.
pub fn trim_history(messages: &[ChatMessage], budget_chars: usize) -> Vec<ChatMessage> {
    let mut kept: Vec<ChatMessage> = Vec::new();
    let mut used = 0usize;

    for message in messages.iter().rev().filter(|m| m.role != Role::System) {
        let len = message.content.chars().count();
        if !kept.is_empty() && used + len > budget_chars {
            break;
        }
        used += len;
        kept.push(message.clone());
    }

    kept.reverse();
    kept
}

/// System prompt followed by the trimmed history.
pub fn prepare_conversation(
    messages: &[ChatMessage],
    options: &EnhancementOptions,
    budget_chars: usize,
) -> Vec<ChatMessage> {
    let mut conversation = Vec::with_capacity(messages.len() + 1);
    conversation.push(ChatMessage::system(prompts::chat_system_prompt(options)));
    conversation.extend(trim_history(messages, budget_chars));
    conversation
}

/// The most recent user turn.
pub fn last_user_message(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages.iter().rev().find(|m| m.role == Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_messages_within_budget() {
        let messages = vec![
            ChatMessage::user("a".repeat(50)),
            ChatMessage::assistant("b".repeat(50)),
            ChatMessage::user("c".repeat(30)),
        ];
        let trimmed = trim_history(&messages, 90);
        assert_eq!(trimmed.len(), 2);
        assert!(trimmed[0].content.starts_with('b'));
        assert!(trimmed[1].content.starts_with('c'));
    }

    #[test]
    fn newest_message_survives_tiny_budget() {
        let messages = vec![ChatMessage::user("x".repeat(500))];
        let trimmed = trim_history(&messages, 10);
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn conversation_starts_with_single_system_prompt() {
        let messages = vec![
            ChatMessage::system("old system prompt"),
            ChatMessage::user("make it formal"),
        ];
        let conv = prepare_conversation(&messages, &EnhancementOptions::new("formal"), 1000);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv[0].role, Role::System);
        assert!(conv[0].content.contains("formal"));
        assert_eq!(conv[1].content, "make it formal");
    }

    #[test]
    fn finds_last_user_message() {
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
            ChatMessage::assistant("reply 2"),
        ];
        assert_eq!(last_user_message(&messages).unwrap().content, "second");
        assert!(last_user_message(&[ChatMessage::assistant("hi")]).is_none());
    }
}
