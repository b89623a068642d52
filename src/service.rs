//! Request boundary: input validation, privacy screening, and the
//! configuration operations. Every failure leaves here as an [`ErrorEnvelope`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::{CaptureDiagnostics, CaptureResult, CommandCapture, TextCapture};
use crate::chat;
use crate::config::Config;
use crate::error::StoreError;
use crate::orchestrator::FallbackOrchestrator;
use crate::privacy::PrivacyGate;
use crate::registry::{ProviderRegistry, configure_from, resolve_descriptor};
use crate::response::{ErrorCode, ErrorEnvelope};
use crate::store::{FileProviderStore, ProviderStore};
use crate::types::{
    ChatMessage, ChatResult, EnhancementOptions, EnhancementResult, ProviderDescriptor,
    ProviderName, ProviderUpdate,
};

/// Outcome of a direct connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTest {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureEnhancement {
    pub capture: CaptureResult,
    pub result: EnhancementResult,
}

pub struct EnhanceService {
    registry: Arc<ProviderRegistry>,
    orchestrator: FallbackOrchestrator,
    gate: PrivacyGate,
    capture: Arc<dyn TextCapture>,
    max_text_chars: usize,
    test_timeout: Duration,
}

impl EnhanceService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        capture: Arc<dyn TextCapture>,
        config: &Config,
    ) -> Self {
        let orchestrator = FallbackOrchestrator::new(registry.clone())
            .with_attempt_timeout(config.attempt_timeout())
            .with_chat_context_chars(config.chat_context_chars);
        Self {
            registry,
            orchestrator,
            gate: PrivacyGate::new(),
            capture,
            max_text_chars: config.max_text_chars,
            test_timeout: config.test_timeout(),
        }
    }

    /// File-backed store, built-in adapters, platform capture tools.
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<dyn ProviderStore> = Arc::new(FileProviderStore::new(&config.store_path));
        let registry = Arc::new(ProviderRegistry::new(store));
        let capture = Arc::new(CommandCapture::detect(&config.capture));
        Self::new(registry, capture, config)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    fn screen(&self, text: &str) -> Result<(), ErrorEnvelope> {
        if text.is_empty() {
            return Err(
                ErrorEnvelope::new(ErrorCode::NoTextSelected, "No text selected").with_text_length(0),
            );
        }
        let len = text.chars().count();
        if len > self.max_text_chars {
            return Err(ErrorEnvelope::new(
                ErrorCode::TextTooLong,
                format!(
                    "Text is too long ({len} characters). Maximum is {} characters.",
                    self.max_text_chars
                ),
            )
            .with_text_length(len));
        }
        self.reject_sensitive([text])
            .map_err(|e| e.with_text_length(len))
    }

    /// Privacy gate over every piece of text that will be sent to a provider.
    fn reject_sensitive<'a>(
        &self,
        parts: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ErrorEnvelope> {
        for part in parts {
            if let Err(found) = self.gate.check(part) {
                tracing::warn!(category = found.as_str(), "rejected sensitive text");
                return Err(ErrorEnvelope::new(
                    ErrorCode::SensitiveData,
                    format!(
                        "Text appears to contain sensitive data ({found}). Remove it and try again."
                    ),
                ));
            }
        }
        Ok(())
    }

    pub async fn enhance(
        &self,
        text: &str,
        options: &EnhancementOptions,
    ) -> Result<EnhancementResult, ErrorEnvelope> {
        let start = Instant::now();
        let text = text.trim();
        self.screen(text)
            .and_then(|()| self.reject_sensitive(options.context.as_deref()))
            .map_err(|e| e.with_enhancement_type(options.kind.as_str()))?;

        self.orchestrator.enhance(text, options).await.map_err(|e| {
            ErrorEnvelope::from(e)
                .with_text_length(text.chars().count())
                .with_enhancement_type(options.kind.as_str())
                .with_processing_time(start.elapsed().as_millis() as u64)
        })
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &EnhancementOptions,
    ) -> Result<ChatResult, ErrorEnvelope> {
        let start = Instant::now();
        let latest = chat::last_user_message(messages)
            .map(|m| m.content.trim())
            .unwrap_or_default();
        // Earlier turns travel with the request too.
        let history = messages.iter().map(|m| m.content.as_str());
        self.screen(latest)
            .and_then(|()| self.reject_sensitive(history.chain(options.context.as_deref())))
            .map_err(|e| e.with_enhancement_type(options.kind.as_str()))?;

        self.orchestrator.chat(messages, options).await.map_err(|e| {
            ErrorEnvelope::from(e)
                .with_enhancement_type(options.kind.as_str())
                .with_processing_time(start.elapsed().as_millis() as u64)
        })
    }

    /// Capture the current selection, then enhance it.
    pub async fn capture_and_enhance(
        &self,
        options: &EnhancementOptions,
    ) -> Result<CaptureEnhancement, ErrorEnvelope> {
        let capture = self.capture.capture().await;
        let diagnostics = CaptureDiagnostics::from(&capture);
        if !capture.platform_tool_available {
            return Err(ErrorEnvelope::new(
                ErrorCode::CaptureFailed,
                capture
                    .error
                    .clone()
                    .unwrap_or_else(|| "Text capture tool unavailable".to_string()),
            )
            .with_capture(diagnostics));
        }
        let result = self
            .enhance(&capture.text, options)
            .await
            .map_err(|e| e.with_capture(diagnostics))?;
        Ok(CaptureEnhancement { capture, result })
    }

    /// Saved descriptors with credentials masked.
    pub async fn get_providers(&self) -> Result<Vec<ProviderDescriptor>, ErrorEnvelope> {
        self.registry
            .store()
            .load()
            .await
            .map(|ds| ds.iter().map(ProviderDescriptor::masked).collect())
            .map_err(store_envelope)
    }

    /// Persist a partial update and return the saved descriptor, masked.
    pub async fn save_provider(
        &self,
        name: &str,
        update: &ProviderUpdate,
    ) -> Result<ProviderDescriptor, ErrorEnvelope> {
        let name = parse_name(name)?;
        let saved = self
            .registry
            .store()
            .save(name, update)
            .await
            .map_err(store_envelope)?;
        tracing::debug!(
            provider = %name,
            enabled = saved.enabled,
            priority = saved.priority,
            "provider updated"
        );
        Ok(saved.masked())
    }

    /// Probe one backend directly, outside the fallback loop.
    pub async fn test_provider(&self, name: &str) -> Result<ConnectionTest, ErrorEnvelope> {
        let name = parse_name(name)?;
        let adapter = self.registry.get_provider(name.as_str()).ok_or_else(|| {
            ErrorEnvelope::new(
                ErrorCode::ProviderNotFound,
                format!("Provider not found: {name}"),
            )
        })?;

        let descriptors = self.registry.descriptors().await;
        let descriptor = resolve_descriptor(&descriptors, name)
            .cloned()
            .unwrap_or_else(|| ProviderDescriptor::defaults_for(name));

        if !name.is_local() && descriptor.api_key.trim().is_empty() {
            return Ok(ConnectionTest::failed("API key not configured"));
        }
        configure_from(adapter, &descriptor);

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.test_timeout, adapter.test_connection()).await
        {
            Ok(Ok(())) => ConnectionTest::ok(),
            Ok(Err(e)) => ConnectionTest::failed(e.user_message()),
            Err(_) => ConnectionTest::failed(format!(
                "Request timeout after {}ms",
                self.test_timeout.as_millis()
            )),
        };
        tracing::info!(
            provider = %name,
            success = outcome.success,
            latency_ms = start.elapsed().as_millis() as u64,
            "provider connection test"
        );
        Ok(outcome)
    }
}

fn parse_name(name: &str) -> Result<ProviderName, ErrorEnvelope> {
    name.parse()
        .map_err(|e: String| ErrorEnvelope::new(ErrorCode::ProviderNotFound, e))
}

fn store_envelope(e: StoreError) -> ErrorEnvelope {
    match e {
        StoreError::UnknownProvider(name) => ErrorEnvelope::new(
            ErrorCode::ProviderNotFound,
            format!("Provider not found: {name}"),
        ),
        other => ErrorEnvelope::new(ErrorCode::InvalidConfig, other.to_string()),
    }
}
