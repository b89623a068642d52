use serde::Serialize;
use thiserror::Error;

use crate::types::now_ms;

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("{provider} is not configured")]
    NotConfigured { provider: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Provider name for variants that carry one.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider, .. } => Some(provider),
            Self::Upstream { provider, .. } => Some(provider),
            Self::AuthFailed { provider, .. } => Some(provider),
            Self::EmptyResponse { provider } => Some(provider),
            Self::NotConfigured { provider } => Some(provider),
            _ => None,
        }
    }

    /// True when the backend rejected the credential.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::AuthFailed { .. } => true,
            Self::Upstream { status, .. } => matches!(status, Some(401 | 403)),
            _ => false,
        }
    }

    /// Message safe to show an end user. Keeps backend detail, drops connection internals.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::RateLimited { provider, message } => {
                format!("rate limited by {provider} ({message}), try again shortly")
            }
            Self::Upstream {
                provider, message, ..
            } => format!("upstream error from {provider}: {message}"),
            Self::AuthFailed { provider, message } => {
                format!("authentication failed for {provider}: {message}, check your API key")
            }
            Self::SchemaParse(_) => "failed to parse provider response".to_string(),
            Self::EmptyResponse { provider } => format!("{provider} returned no text"),
            Self::NotConfigured { provider } => format!("{provider} is not configured"),
            Self::Request(e) if e.is_connect() => "could not connect to provider".to_string(),
            Self::Request(e) if e.is_timeout() => "request to provider timed out".to_string(),
            Self::Request(_) => "request to provider failed".to_string(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

/// One failed attempt inside an orchestration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub provider: String,
    pub error: String,
    pub timestamp: u64,
}

impl FailureRecord {
    pub fn new(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            error: error.into(),
            timestamp: now_ms(),
        }
    }
}

/// Outcome of an orchestration call that produced no result.
#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    #[error("No AI providers available. Enable a provider and configure its API key.")]
    NoProvidersAvailable,

    #[error("All {attempted} providers failed: {}", join_failures(.failures))]
    AllProvidersFailed {
        attempted: usize,
        failures: Vec<FailureRecord>,
    },
}

impl OrchestrationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoProvidersAvailable => "NO_PROVIDERS_AVAILABLE",
            Self::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
        }
    }

    pub fn failures(&self) -> &[FailureRecord] {
        match self {
            Self::NoProvidersAvailable => &[],
            Self::AllProvidersFailed { failures, .. } => failures,
        }
    }
}

fn join_failures(failures: &[FailureRecord]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("provider store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("invalid provider update: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: Box<toml::de::Error>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_message_lists_every_failure() {
        let err = OrchestrationError::AllProvidersFailed {
            attempted: 2,
            failures: vec![
                FailureRecord::new("openai", "unauthorized"),
                FailureRecord::new("ollama", "connection refused"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "All 2 providers failed: openai: unauthorized; ollama: connection refused"
        );
        assert_eq!(err.code(), "ALL_PROVIDERS_FAILED");
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn no_providers_has_no_failures() {
        let err = OrchestrationError::NoProvidersAvailable;
        assert_eq!(err.code(), "NO_PROVIDERS_AVAILABLE");
        assert!(err.failures().is_empty());
    }

    #[test]
    fn auth_detection_covers_status_codes() {
        let err = ProviderError::Upstream {
            provider: "openai".into(),
            message: "401 Unauthorized".into(),
            status: Some(401),
        };
        assert!(err.is_auth());
        let err = ProviderError::Upstream {
            provider: "openai".into(),
            message: "500".into(),
            status: Some(500),
        };
        assert!(!err.is_auth());
    }

    #[test]
    fn auth_user_message_points_at_key() {
        let err = ProviderError::AuthFailed {
            provider: "anthropic".into(),
            message: "invalid x-api-key".into(),
        };
        let msg = err.user_message();
        assert!(msg.contains("invalid x-api-key"));
        assert!(msg.contains("API key"));
    }
}
