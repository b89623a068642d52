//! Fallback orchestration against stub adapters with call counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use textlift::error::{OrchestrationError, ProviderError};
use textlift::orchestrator::FallbackOrchestrator;
use textlift::provider::{Adapter, ChatProvider, Provider};
use textlift::registry::ProviderRegistry;
use textlift::store::MemoryProviderStore;
use textlift::types::{
    ChatCompletion, ChatMessage, EnhancementOptions, EnhancementResult, ProviderDescriptor,
    ProviderName, Role, Suggestion,
};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed(&'static str),
    Fail(&'static str),
    Hang,
}

type Hook = Box<dyn Fn() + Send + Sync>;

struct Stub {
    name: ProviderName,
    behavior: Behavior,
    never_configured: bool,
    key: Mutex<String>,
    calls: AtomicUsize,
    chat_calls: AtomicUsize,
    received_text: Mutex<Vec<String>>,
    received_chat: Mutex<Vec<Vec<ChatMessage>>>,
    on_call: Option<Hook>,
}

impl Stub {
    fn new(name: ProviderName, behavior: Behavior) -> Self {
        Self {
            name,
            behavior,
            never_configured: false,
            key: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            received_text: Mutex::new(Vec::new()),
            received_chat: Mutex::new(Vec::new()),
            on_call: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst) + self.chat_calls.load(Ordering::SeqCst)
    }

    async fn act(&self) -> Result<String, ProviderError> {
        if let Some(ref hook) = self.on_call {
            hook();
        }
        match self.behavior {
            Behavior::Succeed(text) => Ok(text.to_string()),
            Behavior::Fail(msg) => Err(ProviderError::Other(msg.to_string())),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

#[async_trait]
impl Provider for Stub {
    fn name(&self) -> ProviderName {
        self.name
    }

    fn configure(&self, api_key: &str, _model: Option<&str>, _base_url: Option<&str>) {
        *self.key.lock().unwrap() = api_key.to_string();
    }

    fn is_configured(&self) -> bool {
        !self.never_configured && (self.name.is_local() || !self.key.lock().unwrap().is_empty())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received_text.lock().unwrap().push(text.to_string());
        let out = self.act().await?;
        Ok(EnhancementResult {
            original: text.to_string(),
            suggestions: vec![Suggestion::ranked(out, &options.kind, 0)],
            provider: self.name.to_string(),
            tokens_used: None,
            processing_time_ms: 0,
        })
    }
}

#[async_trait]
impl ChatProvider for Stub {
    async fn enhance_chat(
        &self,
        messages: &[ChatMessage],
        _options: &EnhancementOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.received_chat.lock().unwrap().push(messages.to_vec());
        let text = self.act().await?;
        Ok(ChatCompletion {
            text,
            tokens_used: Some(1),
            finish_reason: Some("stop".to_string()),
        })
    }
}

fn descriptor(name: ProviderName, priority: u32, key: &str, enabled: bool) -> ProviderDescriptor {
    ProviderDescriptor {
        api_key: key.to_string(),
        enabled,
        priority,
        ..ProviderDescriptor::defaults_for(name)
    }
}

fn completion(stub: &Arc<Stub>) -> Adapter {
    Adapter::Completion(stub.clone())
}

fn chat(stub: &Arc<Stub>) -> Adapter {
    Adapter::Chat(stub.clone())
}

fn orchestrator(
    descriptors: Vec<ProviderDescriptor>,
    adapters: Vec<Adapter>,
) -> (FallbackOrchestrator, Arc<MemoryProviderStore>) {
    let store = Arc::new(MemoryProviderStore::new(descriptors));
    let registry = Arc::new(ProviderRegistry::with_adapters(store.clone(), adapters));
    let orch = FallbackOrchestrator::new(registry).with_attempt_timeout(Duration::from_millis(200));
    (orch, store)
}

fn opts() -> EnhancementOptions {
    EnhancementOptions::new("grammar")
}

#[tokio::test]
async fn tries_candidates_in_priority_order() {
    let openai = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Fail("openai down")));
    let anthropic = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Fail("anthropic down")));
    let openrouter = Arc::new(Stub::new(ProviderName::OpenRouter, Behavior::Fail("openrouter down")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 3, "k1", true),
            descriptor(ProviderName::Anthropic, 1, "k2", true),
            descriptor(ProviderName::OpenRouter, 2, "k3", true),
        ],
        vec![completion(&openai), completion(&anthropic), completion(&openrouter)],
    );

    let err = assert_err!(orch.enhance("teh text", &opts()).await);
    let order: Vec<&str> = err.failures().iter().map(|f| f.provider.as_str()).collect();
    assert_eq!(order, vec!["anthropic", "openrouter", "openai"]);
    assert_eq!(openai.calls(), 1);
    assert_eq!(anthropic.calls(), 1);
    assert_eq!(openrouter.calls(), 1);
}

#[tokio::test]
async fn stops_at_first_success() {
    let first = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Fail("boom")));
    let second = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Succeed("fixed text")));
    let third = Arc::new(Stub::new(ProviderName::OpenRouter, Behavior::Succeed("never")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", true),
            descriptor(ProviderName::Anthropic, 2, "k", true),
            descriptor(ProviderName::OpenRouter, 3, "k", true),
        ],
        vec![completion(&first), completion(&second), completion(&third)],
    );

    let result = assert_ok!(orch.enhance("teh text", &opts()).await);
    assert_eq!(result.provider, "anthropic");
    assert_eq!(result.suggestions[0].text, "fixed text");
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    assert_eq!(third.calls(), 0);
}

#[tokio::test]
async fn disabled_and_keyless_providers_are_never_called() {
    let disabled = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Succeed("nope")));
    let keyless = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Succeed("nope")));
    let local = Arc::new(Stub::new(ProviderName::Ollama, Behavior::Succeed("local fix")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", false),
            descriptor(ProviderName::Anthropic, 2, "", true),
            descriptor(ProviderName::Ollama, 3, "", true),
        ],
        vec![completion(&disabled), completion(&keyless), completion(&local)],
    );

    let result = assert_ok!(orch.enhance("text", &opts()).await);
    assert_eq!(result.provider, "ollama");
    assert_eq!(disabled.calls(), 0);
    assert_eq!(keyless.calls(), 0);
}

#[tokio::test]
async fn no_candidates_fails_without_calling_anything() {
    let a = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Succeed("x")));
    let b = Arc::new(Stub::new(ProviderName::Ollama, Behavior::Succeed("x")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", false),
            descriptor(ProviderName::Ollama, 2, "", false),
        ],
        vec![completion(&a), completion(&b)],
    );

    let err = assert_err!(orch.enhance("text", &opts()).await);
    assert!(matches!(err, OrchestrationError::NoProvidersAvailable));
    assert_eq!(err.code(), "NO_PROVIDERS_AVAILABLE");
    assert_eq!(a.calls() + b.calls(), 0);

    let err = assert_err!(orch.chat(&[ChatMessage::user("hi")], &opts()).await);
    assert!(matches!(err, OrchestrationError::NoProvidersAvailable));
}

#[tokio::test]
async fn aggregate_failure_lists_every_attempt() {
    let a = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Fail("unauthorized")));
    let b = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Fail("rate limited")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", true),
            descriptor(ProviderName::Anthropic, 2, "k", true),
        ],
        vec![completion(&a), completion(&b)],
    );

    let err = assert_err!(orch.enhance("text", &opts()).await);
    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].provider, "openai");
    assert_eq!(failures[0].error, "unauthorized");
    assert_eq!(failures[1].provider, "anthropic");
    assert_eq!(failures[1].error, "rate limited");
    assert!(failures.iter().all(|f| f.timestamp > 0));
    assert_eq!(
        err.to_string(),
        "All 2 providers failed: openai: unauthorized; anthropic: rate limited"
    );
}

#[tokio::test]
async fn hung_provider_is_skipped_after_timeout() {
    let slow = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Hang));
    let fast = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Succeed("on time")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", true),
            descriptor(ProviderName::Anthropic, 2, "k", true),
        ],
        vec![completion(&slow), completion(&fast)],
    );

    let result = assert_ok!(orch.enhance("text", &opts()).await);
    assert_eq!(result.provider, "anthropic");
    assert_eq!(result.suggestions[0].text, "on time");
    assert_eq!(slow.calls(), 1);
    // Covers the whole call, including the timed-out attempt.
    assert!(result.processing_time_ms >= 200);
}

#[tokio::test]
async fn timeout_is_recorded_like_any_other_failure() {
    let slow = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Hang));
    let (orch, _) = orchestrator(
        vec![descriptor(ProviderName::OpenAi, 1, "k", true)],
        vec![completion(&slow)],
    );
    let orch = orch.with_attempt_timeout(Duration::from_millis(50));

    let err = assert_err!(orch.enhance("text", &opts()).await);
    assert_eq!(err.failures()[0].error, "Request timeout after 50ms");
}

#[tokio::test]
async fn repeated_calls_attempt_providers_in_the_same_order() {
    let a = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Fail("a down")));
    let b = Arc::new(Stub::new(ProviderName::OpenRouter, Behavior::Fail("b down")));
    let c = Arc::new(Stub::new(ProviderName::Ollama, Behavior::Fail("c down")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 2, "k", true),
            descriptor(ProviderName::OpenRouter, 2, "k", true),
            descriptor(ProviderName::Ollama, 1, "", true),
        ],
        vec![completion(&a), completion(&b), completion(&c)],
    );

    let order = |err: &OrchestrationError| -> Vec<String> {
        err.failures().iter().map(|f| f.provider.clone()).collect()
    };
    let first = assert_err!(orch.enhance("text", &opts()).await);
    let second = assert_err!(orch.enhance("text", &opts()).await);
    assert_eq!(order(&first), vec!["ollama", "openai", "openrouter"]);
    assert_eq!(order(&first), order(&second));
    assert_eq!(orch.candidates().await, order(&second));
    assert_eq!(a.calls() + b.calls() + c.calls(), 6);
}

#[tokio::test]
async fn stale_duplicate_entry_does_not_shadow_live_one() {
    let openai = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Succeed("fixed")));
    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 5, "", false),
            descriptor(ProviderName::OpenAi, 1, "sk-live", true),
        ],
        vec![completion(&openai)],
    );

    let result = assert_ok!(orch.enhance("text", &opts()).await);
    assert_eq!(result.provider, "openai");
    assert_eq!(*openai.key.lock().unwrap(), "sk-live");
    assert_eq!(openai.calls(), 1);
}

#[tokio::test]
async fn completion_only_adapter_gets_last_user_message() {
    let local = Arc::new(Stub::new(ProviderName::Ollama, Behavior::Succeed("Polished.")));
    let (orch, _) = orchestrator(
        vec![descriptor(ProviderName::Ollama, 1, "", true)],
        vec![completion(&local)],
    );

    let messages = vec![
        ChatMessage::user("first draft"),
        ChatMessage::assistant("First draft."),
        ChatMessage::user("make it shorter please"),
    ];
    let reply = assert_ok!(orch.chat(&messages, &opts()).await);
    assert_eq!(reply.text, "Polished.");
    assert_eq!(reply.provider, "ollama");
    assert!(reply.finish_reason.is_none());
    assert_eq!(
        *local.received_text.lock().unwrap(),
        vec!["make it shorter please".to_string()]
    );
    assert_eq!(local.chat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_adapter_gets_prepared_conversation() {
    let remote = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Succeed("Sure.")));
    let (orch, _) = orchestrator(
        vec![descriptor(ProviderName::OpenAi, 1, "k", true)],
        vec![chat(&remote)],
    );

    let messages = vec![
        ChatMessage::system("ignored"),
        ChatMessage::user("fix: i has a apple"),
    ];
    let reply = assert_ok!(orch.chat(&messages, &opts()).await);
    assert_eq!(reply.text, "Sure.");
    assert_eq!(reply.finish_reason.as_deref(), Some("stop"));

    let received = remote.received_chat.lock().unwrap();
    let conversation = &received[0];
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation[0].role, Role::System);
    assert_ne!(conversation[0].content, "ignored");
    assert_eq!(conversation[1].content, "fix: i has a apple");
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_falls_back_across_capabilities() {
    let remote = Arc::new(Stub::new(ProviderName::OpenAi, Behavior::Fail("unauthorized")));
    let local = Arc::new(Stub::new(ProviderName::Ollama, Behavior::Succeed("Done.")));
    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", true),
            descriptor(ProviderName::Ollama, 2, "", true),
        ],
        vec![chat(&remote), completion(&local)],
    );

    let reply = assert_ok!(orch.chat(&[ChatMessage::user("hello")], &opts()).await);
    assert_eq!(reply.provider, "ollama");
    assert_eq!(remote.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(local.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_adapter_is_recorded_as_not_found() {
    let local = Arc::new(Stub::new(ProviderName::Ollama, Behavior::Succeed("ok")));
    let mut legacy = descriptor(ProviderName::OpenAi, 1, "k", true);
    legacy.name = "cohere".to_string();

    let (orch, _) = orchestrator(
        vec![
            legacy,
            descriptor(ProviderName::Anthropic, 2, "k", true),
            descriptor(ProviderName::Ollama, 3, "", false),
        ],
        vec![completion(&local)],
    );

    let err = assert_err!(orch.enhance("text", &opts()).await);
    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].provider, "cohere");
    assert_eq!(failures[0].error, "Provider not found");
    assert_eq!(failures[1].provider, "anthropic");
    assert_eq!(failures[1].error, "Provider not found");
}

#[tokio::test]
async fn adapter_refusing_configuration_is_skipped() {
    let mut broken = Stub::new(ProviderName::OpenAi, Behavior::Succeed("x"));
    broken.never_configured = true;
    let broken = Arc::new(broken);
    let good = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Fail("down")));

    let (orch, _) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", true),
            descriptor(ProviderName::Anthropic, 2, "k", true),
        ],
        vec![completion(&broken), completion(&good)],
    );

    let err = assert_err!(orch.enhance("text", &opts()).await);
    assert_eq!(err.failures()[0].error, "Provider not properly configured");
    assert_eq!(broken.calls(), 0);
    assert_eq!(err.failures()[1].error, "down");
}

#[tokio::test]
async fn key_removed_mid_call_is_seen_by_later_attempts() {
    let store_slot: Arc<Mutex<Option<Arc<MemoryProviderStore>>>> = Arc::new(Mutex::new(None));
    let slot = store_slot.clone();

    let mut first = Stub::new(ProviderName::OpenAi, Behavior::Fail("boom"));
    first.on_call = Some(Box::new(move || {
        if let Some(store) = slot.lock().unwrap().as_ref() {
            store.replace(vec![
                descriptor(ProviderName::OpenAi, 1, "k", true),
                descriptor(ProviderName::Anthropic, 2, "", true),
            ]);
        }
    }));
    let first = Arc::new(first);
    let second = Arc::new(Stub::new(ProviderName::Anthropic, Behavior::Succeed("x")));

    let (orch, store) = orchestrator(
        vec![
            descriptor(ProviderName::OpenAi, 1, "k", true),
            descriptor(ProviderName::Anthropic, 2, "k", true),
        ],
        vec![completion(&first), completion(&second)],
    );
    *store_slot.lock().unwrap() = Some(store);

    let err = assert_err!(orch.enhance("text", &opts()).await);
    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[1].provider, "anthropic");
    assert_eq!(failures[1].error, "API key not configured");
    assert_eq!(second.calls(), 0);
}
