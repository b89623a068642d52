//! Selected-text capture through platform clipboard tools.
//!
//! Copy is simulated with a key-injection tool, then the clipboard is read
//! back. Every subprocess runs in its own process group so a hung tool can be
//! killed along with anything it spawned.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::CaptureConfig;

/// Clipboard contents beyond this are truncated.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub text: String,
    pub captured_from: String,
    pub copy_simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
    pub platform_tool_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything about a capture except the captured text. Safe to echo in errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDiagnostics {
    pub captured_from: String,
    pub copy_simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
    pub platform_tool_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CaptureResult> for CaptureDiagnostics {
    fn from(c: &CaptureResult) -> Self {
        Self {
            captured_from: c.captured_from.clone(),
            copy_simulated: c.copy_simulated,
            capture_method: c.capture_method.clone(),
            attempt_count: c.attempt_count,
            total_duration_ms: c.total_duration_ms,
            platform_tool_available: c.platform_tool_available,
            error: c.error.clone(),
        }
    }
}

#[async_trait]
pub trait TextCapture: Send + Sync {
    async fn capture(&self) -> CaptureResult;
}

/// A program plus fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Copy and paste tools for one desktop environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTools {
    pub label: &'static str,
    pub copy: Option<ToolCommand>,
    pub paste: ToolCommand,
}

impl PlatformTools {
    pub fn x11() -> Self {
        Self {
            label: "x11",
            copy: Some(ToolCommand::new("xdotool", &["key", "--clearmodifiers", "ctrl+c"])),
            paste: ToolCommand::new("xclip", &["-o", "-selection", "clipboard"]),
        }
    }

    pub fn wayland() -> Self {
        Self {
            label: "wayland",
            copy: Some(ToolCommand::new("wtype", &["-M", "ctrl", "c", "-m", "ctrl"])),
            paste: ToolCommand::new("wl-paste", &["--no-newline"]),
        }
    }

    pub fn macos() -> Self {
        Self {
            label: "macos",
            copy: Some(ToolCommand::new(
                "osascript",
                &[
                    "-e",
                    "tell application \"System Events\" to keystroke \"c\" using command down",
                ],
            )),
            paste: ToolCommand::new("pbpaste", &[]),
        }
    }

    /// Pick tools for the running session.
    pub fn detect() -> Self {
        Self::detect_with(cfg!(target_os = "macos"), |key| std::env::var(key).ok())
    }

    fn detect_with(is_macos: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if is_macos {
            return Self::macos();
        }
        let wayland = lookup("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty())
            || lookup("XDG_SESSION_TYPE").is_some_and(|v| v.eq_ignore_ascii_case("wayland"));
        if wayland { Self::wayland() } else { Self::x11() }
    }
}

#[derive(Debug)]
enum ToolError {
    Missing,
    Timeout(u64),
    Failed(String),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("tool not found"),
            Self::Timeout(ms) => write!(f, "timed out after {ms}ms"),
            Self::Failed(msg) => f.write_str(msg),
        }
    }
}

/// Run `tool` and return its stdout.
///
/// The child is its own process group leader; on timeout the whole group
/// receives SIGKILL.
async fn run_tool(tool: &ToolCommand, timeout: Duration) -> Result<String, ToolError> {
    let mut cmd = Command::new(&tool.program);
    cmd.args(&tool.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::Missing,
        _ => ToolError::Failed(format!("failed to spawn {}: {e}", tool.program)),
    })?;
    let child_pid = child.id();
    let stdout = child.stdout.take();

    let read = async {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout {
            let mut capped = pipe.take(MAX_CAPTURE_BYTES as u64);
            capped.read_to_end(&mut buf).await?;
        }
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((buf, status))
    };

    match tokio::time::timeout(timeout, read).await {
        Ok(Ok((buf, status))) if status.success() => Ok(String::from_utf8_lossy(&buf).into_owned()),
        Ok(Ok((_, status))) => Err(ToolError::Failed(format!(
            "{} exited with {}",
            tool.program,
            status.code().unwrap_or(-1)
        ))),
        Ok(Err(e)) => Err(ToolError::Failed(format!(
            "failed to read from {}: {e}",
            tool.program
        ))),
        Err(_) => {
            if let Some(pid) = child_pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            Err(ToolError::Timeout(timeout.as_millis() as u64))
        }
    }
}

/// Capture via external programs.
pub struct CommandCapture {
    tools: PlatformTools,
    retries: u32,
    retry_delay: Duration,
    tool_timeout: Duration,
}

impl CommandCapture {
    pub fn new(tools: PlatformTools, config: &CaptureConfig) -> Self {
        Self {
            tools,
            retries: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            tool_timeout: Duration::from_millis(config.tool_timeout_ms.max(1)),
        }
    }

    pub fn detect(config: &CaptureConfig) -> Self {
        Self::new(PlatformTools::detect(), config)
    }
}

#[async_trait]
impl TextCapture for CommandCapture {
    async fn capture(&self) -> CaptureResult {
        let start = Instant::now();
        let mut result = CaptureResult {
            captured_from: self.tools.label.to_string(),
            platform_tool_available: true,
            ..Default::default()
        };

        if let Some(ref copy) = self.tools.copy {
            match run_tool(copy, self.tool_timeout).await {
                Ok(_) => {
                    result.copy_simulated = true;
                    // Let the target application publish the selection.
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(ToolError::Missing) => {
                    tracing::debug!(tool = %copy.program, "copy tool not installed");
                }
                Err(e) => {
                    tracing::debug!(tool = %copy.program, "copy simulation failed: {e}");
                }
            }
        }

        let mut last_error = None;
        for attempt in 1..=self.retries {
            result.attempt_count = Some(attempt);
            match run_tool(&self.tools.paste, self.tool_timeout).await {
                Ok(text) if !text.trim().is_empty() => {
                    result.text = text;
                    result.capture_method = Some(self.tools.paste.program.clone());
                    last_error = None;
                    break;
                }
                Ok(_) => last_error = Some("clipboard is empty".to_string()),
                Err(ToolError::Missing) => {
                    result.platform_tool_available = false;
                    last_error = Some(format!("{} is not installed", self.tools.paste.program));
                    break;
                }
                Err(e) => last_error = Some(format!("{}: {e}", self.tools.paste.program)),
            }
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        result.total_duration_ms = Some(start.elapsed().as_millis() as u64);
        result.error = last_error;
        tracing::debug!(
            method = ?result.capture_method,
            attempts = ?result.attempt_count,
            chars = result.text.chars().count(),
            "capture finished"
        );
        result
    }
}
