use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chat::{self, DEFAULT_CONTEXT_CHARS};
use crate::error::{FailureRecord, OrchestrationError, ProviderError};
use crate::provider::Adapter;
use crate::registry::{ProviderRegistry, configure_from, resolve_descriptor};
use crate::types::{
    ChatMessage, ChatResult, EnhancementOptions, EnhancementResult, ProviderDescriptor,
};

/// Per-attempt ceiling. A provider that has not answered by then is skipped.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Names of the providers to try, in order.
///
/// Eligible = enabled, and local or holding a non-empty key. Sorted by
/// ascending priority; the sort is stable so equal priorities keep store
/// order. Known backends are reported by their canonical name, so a name
/// listed twice (in any case) is only tried once, at its best position.
pub fn candidate_order(descriptors: &[ProviderDescriptor]) -> Vec<String> {
    let mut eligible: Vec<&ProviderDescriptor> =
        descriptors.iter().filter(|d| d.is_eligible()).collect();
    eligible.sort_by_key(|d| d.priority);

    let mut names: Vec<String> = Vec::with_capacity(eligible.len());
    for d in eligible {
        let name = match d.provider_name() {
            Some(known) => known.as_str().to_string(),
            None => d.name.clone(),
        };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// What a single attempt should do with the adapter.
enum Request<'a> {
    Enhance {
        text: &'a str,
        options: &'a EnhancementOptions,
    },
    Chat {
        conversation: &'a [ChatMessage],
        last_user: Option<&'a str>,
        options: &'a EnhancementOptions,
    },
}

enum Outcome {
    Enhanced(EnhancementResult),
    Chatted(ChatResult),
}

/// Sequential provider fallback with at-most-one success.
///
/// Holds no state between calls: configuration is re-read from the store at
/// the start of every call and again before every attempt.
pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    attempt_timeout: Duration,
    chat_context_chars: usize,
}

impl FallbackOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            chat_context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_chat_context_chars(mut self, chars: usize) -> Self {
        self.chat_context_chars = chars;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Candidate order under the latest saved configuration.
    pub async fn candidates(&self) -> Vec<String> {
        candidate_order(&self.registry.apply_config().await)
    }

    /// Enhance `text` with the first provider that succeeds.
    ///
    /// `processing_time_ms` on the result covers the whole call, including
    /// earlier failed attempts.
    pub async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, OrchestrationError> {
        let start = Instant::now();
        match self.run(&Request::Enhance { text, options }).await? {
            Outcome::Enhanced(mut result) => {
                result.processing_time_ms = start.elapsed().as_millis() as u64;
                Ok(result)
            }
            Outcome::Chatted(reply) => Ok(EnhancementResult {
                original: text.to_string(),
                suggestions: vec![crate::types::Suggestion::ranked(
                    reply.text,
                    &options.kind,
                    0,
                )],
                provider: reply.provider,
                tokens_used: reply.tokens_used,
                processing_time_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Chat variant: native multi-turn where the adapter supports it, else a
    /// single-turn enhance of the latest user message.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &EnhancementOptions,
    ) -> Result<ChatResult, OrchestrationError> {
        let start = Instant::now();
        let conversation = chat::prepare_conversation(messages, options, self.chat_context_chars);
        let last_user = chat::last_user_message(messages).map(|m| m.content.as_str());

        let request = Request::Chat {
            conversation: &conversation,
            last_user,
            options,
        };
        let mut reply = match self.run(&request).await? {
            Outcome::Chatted(reply) => reply,
            Outcome::Enhanced(result) => first_suggestion_reply(result),
        };
        reply.processing_time_ms = start.elapsed().as_millis() as u64;
        Ok(reply)
    }

    async fn run(&self, request: &Request<'_>) -> Result<Outcome, OrchestrationError> {
        let snapshot = self.registry.apply_config().await;
        let candidates = candidate_order(&snapshot);

        if candidates.is_empty() {
            tracing::warn!("no eligible providers configured");
            return Err(OrchestrationError::NoProvidersAvailable);
        }

        tracing::info!(candidates = ?candidates, "starting provider fallback");

        let mut failures: Vec<FailureRecord> = Vec::new();

        for (attempt, name) in candidates.iter().enumerate() {
            let Some(adapter) = self.registry.get_provider(name) else {
                tracing::warn!(provider = %name, attempt, "provider not found");
                failures.push(FailureRecord::new(name, "Provider not found"));
                continue;
            };

            // The store may have changed since the snapshot above.
            let latest = self.registry.descriptors().await;
            let descriptor = resolve_descriptor(&latest, adapter.name())
                .cloned()
                .unwrap_or_else(|| ProviderDescriptor::defaults_for(adapter.name()));

            if !adapter.name().is_local() && descriptor.api_key.trim().is_empty() {
                tracing::warn!(provider = %name, attempt, "API key not configured");
                failures.push(FailureRecord::new(name, "API key not configured"));
                continue;
            }

            configure_from(adapter, &descriptor);

            if !adapter.is_configured() {
                tracing::warn!(provider = %name, attempt, "provider not properly configured");
                failures.push(FailureRecord::new(name, "Provider not properly configured"));
                continue;
            }

            let attempt_start = Instant::now();
            tracing::debug!(provider = %name, attempt, model = %descriptor.model, "attempting provider");

            match tokio::time::timeout(self.attempt_timeout, attempt_once(adapter, request)).await {
                Ok(Ok(outcome)) => {
                    tracing::info!(
                        provider = %name,
                        attempt,
                        latency_ms = attempt_start.elapsed().as_millis() as u64,
                        failed_before = failures.len(),
                        "provider succeeded"
                    );
                    return Ok(outcome);
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        provider = %name,
                        attempt,
                        latency_ms = attempt_start.elapsed().as_millis() as u64,
                        "provider failed: {e}"
                    );
                    failures.push(FailureRecord::new(name, e.to_string()));
                }
                Err(_) => {
                    let ms = self.attempt_timeout.as_millis() as u64;
                    tracing::warn!(provider = %name, attempt, timeout_ms = ms, "provider timed out");
                    failures.push(FailureRecord::new(
                        name,
                        format!("Request timeout after {ms}ms"),
                    ));
                }
            }
        }

        tracing::error!(
            attempted = candidates.len(),
            "all providers failed"
        );
        Err(OrchestrationError::AllProvidersFailed {
            attempted: candidates.len(),
            failures,
        })
    }
}

/// One call against one adapter. Dropping this future (on timeout) drops the
/// underlying HTTP request.
async fn attempt_once(adapter: &Adapter, request: &Request<'_>) -> Result<Outcome, ProviderError> {
    match request {
        Request::Enhance { text, options } => {
            let result = adapter.enhance(text, options).await?;
            if result.suggestions.is_empty() {
                return Err(ProviderError::EmptyResponse {
                    provider: adapter.name().to_string(),
                });
            }
            Ok(Outcome::Enhanced(result))
        }
        Request::Chat {
            conversation,
            last_user,
            options,
        } => match adapter.as_chat() {
            Some(chat) => {
                let reply = chat.enhance_chat(conversation, options).await?;
                Ok(Outcome::Chatted(ChatResult {
                    text: reply.text,
                    provider: adapter.name().to_string(),
                    tokens_used: reply.tokens_used,
                    finish_reason: reply.finish_reason,
                    processing_time_ms: 0,
                }))
            }
            None => {
                let text = last_user.ok_or_else(|| {
                    ProviderError::Other("no user message in conversation".to_string())
                })?;
                let result = adapter.enhance(text, options).await?;
                if result.suggestions.is_empty() {
                    return Err(ProviderError::EmptyResponse {
                        provider: adapter.name().to_string(),
                    });
                }
                Ok(Outcome::Enhanced(result))
            }
        },
    }
}

fn first_suggestion_reply(result: EnhancementResult) -> ChatResult {
    let text = result
        .suggestions
        .into_iter()
        .next()
        .map(|s| s.text)
        .unwrap_or_default();
    ChatResult {
        text,
        provider: result.provider,
        tokens_used: result.tokens_used,
        finish_reason: None,
        processing_time_ms: result.processing_time_ms,
    }
}
