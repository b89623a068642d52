use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::capture::CaptureDiagnostics;
use crate::error::{FailureRecord, OrchestrationError};

/// Machine-readable failure codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoTextSelected,
    TextTooLong,
    SensitiveData,
    NoProvidersAvailable,
    AllProvidersFailed,
    EnhancementFailed,
    ProviderNotFound,
    InvalidConfig,
    CaptureFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTextSelected => "NO_TEXT_SELECTED",
            Self::TextTooLong => "TEXT_TOO_LONG",
            Self::SensitiveData => "SENSITIVE_DATA",
            Self::NoProvidersAvailable => "NO_PROVIDERS_AVAILABLE",
            Self::AllProvidersFailed => "ALL_PROVIDERS_FAILED",
            Self::EnhancementFailed => "ENHANCEMENT_FAILED",
            Self::ProviderNotFound => "PROVIDER_NOT_FOUND",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::CaptureFailed => "CAPTURE_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

impl From<&FailureRecord> for ProviderFailure {
    fn from(r: &FailureRecord) -> Self {
        Self {
            provider: r.provider.clone(),
            error: r.error.clone(),
        }
    }
}

/// Error shape returned by every boundary operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhancement_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ProviderFailure>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<Box<CaptureDiagnostics>>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            text_length: None,
            enhancement_type: None,
            processing_time: None,
            errors: None,
            capture: None,
        }
    }

    pub fn with_text_length(mut self, len: usize) -> Self {
        self.text_length = Some(len);
        self
    }

    pub fn with_enhancement_type(mut self, kind: impl Into<String>) -> Self {
        self.enhancement_type = Some(kind.into());
        self
    }

    pub fn with_processing_time(mut self, ms: u64) -> Self {
        self.processing_time = Some(ms);
        self
    }

    pub fn with_capture(mut self, capture: CaptureDiagnostics) -> Self {
        self.capture = Some(Box::new(capture));
        self
    }
}

impl From<OrchestrationError> for ErrorEnvelope {
    fn from(e: OrchestrationError) -> Self {
        match e {
            OrchestrationError::NoProvidersAvailable => {
                Self::new(ErrorCode::NoProvidersAvailable, e.to_string())
            }
            OrchestrationError::AllProvidersFailed { ref failures, .. } => {
                let errors = failures.iter().map(ProviderFailure::from).collect();
                Self {
                    errors: Some(errors),
                    ..Self::new(ErrorCode::AllProvidersFailed, e.to_string())
                }
            }
        }
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.error)
    }
}

/// JSON payload returned as text content by every tool.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub tool: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl ToolResponse {
    pub fn success<T: Serialize>(tool: &'static str, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                status: "success",
                tool,
                result: Some(value),
                error: None,
            },
            Err(e) => Self::error(
                tool,
                ErrorEnvelope::new(
                    ErrorCode::EnhancementFailed,
                    format!("failed to serialize result: {e}"),
                ),
            ),
        }
    }

    pub fn error(tool: &'static str, envelope: ErrorEnvelope) -> Self {
        Self {
            status: "error",
            tool,
            result: None,
            error: Some(envelope),
        }
    }

    pub fn from_result<T: Serialize>(tool: &'static str, result: Result<T, ErrorEnvelope>) -> Self {
        match result {
            Ok(value) => Self::success(tool, &value),
            Err(envelope) => {
                tracing::warn!(tool, code = envelope.code.as_str(), "{}", envelope.error);
                Self::error(tool, envelope)
            }
        }
    }

    /// Always a transport-level success; callers read `status` from the payload.
    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","tool":"{}","error":{{"error":"serialization failed: {escaped}","code":"ENHANCEMENT_FAILED"}}}}"#,
                    self.tool
                ))])
            }
        }
    }
}
