use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProviderError;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Error bodies are only kept for diagnostics; cap what ends up in messages.
const MAX_ERROR_PREVIEW_CHARS: usize = 500;

/// Timeout for `test_connection` round-trips.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP plumbing shared by every adapter.
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build tuned HTTP client, using defaults: {e}");
                Client::new()
            });

        Self { client }
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, ProviderError> {
        let mut builder = self.client.post(url).json(body);
        builder = apply(builder, headers, timeout);
        let bytes = send(provider, builder).await?;
        decode(&bytes)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        headers: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T, ProviderError> {
        let builder = apply(self.client.get(url), headers, timeout);
        let bytes = send(provider, builder).await?;
        decode(&bytes)
    }
}

fn apply(
    mut builder: RequestBuilder,
    headers: &[(&str, String)],
    timeout: Option<Duration>,
) -> RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder
}

async fn send(provider: &str, builder: RequestBuilder) -> Result<Vec<u8>, ProviderError> {
    let response = builder.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = read_capped(provider, response).await.unwrap_or_default();
        let detail = extract_error_message(&body).unwrap_or_else(|| preview(&body));
        let message = if detail.is_empty() {
            format!("{status}")
        } else {
            format!("{status}: {detail}")
        };

        // OpenAI also answers 429 for an exhausted quota.
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                provider: provider.to_string(),
                message,
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthFailed {
                provider: provider.to_string(),
                message,
            });
        }

        return Err(ProviderError::Upstream {
            provider: provider.to_string(),
            message,
            status: Some(status.as_u16()),
        });
    }

    read_capped(provider, response).await
}

/// Read the body, failing once it exceeds `MAX_RESPONSE_BYTES`.
async fn read_capped(provider: &str, response: Response) -> Result<Vec<u8>, ProviderError> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProviderError::Upstream {
            provider: provider.to_string(),
            message: format!("failed to read response body: {e}"),
            status: None,
        })?;
        if buf.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(ProviderError::Upstream {
                provider: provider.to_string(),
                message: format!("response too large (max {MAX_RESPONSE_BYTES} bytes)"),
                status: None,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProviderError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::SchemaParse(format!("failed to parse response: {e}")))
}

/// Pull the human-readable message out of the common error body shapes:
/// `{"error": {"message": ".."}}` and `{"error": ".."}`.
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map.get("message")?.as_str()?.to_string(),
        _ => return None,
    };
    let message = message.trim().to_string();
    (!message.is_empty()).then_some(message)
}

fn preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .trim()
        .chars()
        .take(MAX_ERROR_PREVIEW_CHARS)
        .collect()
}

pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            join_url("http://localhost:11434", "api/chat"),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn extracts_nested_error_message() {
        let body = br#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("Incorrect API key provided")
        );
    }

    #[test]
    fn extracts_flat_error_message() {
        let body = br#"{"error":"model 'llama9' not found"}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("model 'llama9' not found")
        );
    }

    #[test]
    fn non_json_error_body_has_no_message() {
        assert!(extract_error_message(b"<html>Bad Gateway</html>").is_none());
        assert_eq!(preview(b"  <html>Bad Gateway</html> "), "<html>Bad Gateway</html>");
    }
}
