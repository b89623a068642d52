use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::Config;
use crate::response::ToolResponse;
use crate::service::EnhanceService;
use crate::tools::chat::ChatRequest;
use crate::tools::enhance::{CaptureRequest, EnhanceRequest};
use crate::tools::providers::{ProviderNameRequest, SaveProviderRequest};

#[derive(Clone)]
pub struct TextliftServer {
    service: Arc<EnhanceService>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TextliftServer {
    pub fn new(config: Config) -> Self {
        tracing::info!(
            store = %config.store_path.display(),
            attempt_timeout_secs = config.attempt_timeout_secs,
            "textlift configured"
        );
        Self::with_service(Arc::new(EnhanceService::from_config(&config)))
    }

    pub fn with_service(service: Arc<EnhanceService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    pub fn service(&self) -> &Arc<EnhanceService> {
        &self.service
    }

    #[tool(
        name = "enhance",
        description = "Rewrite text with the first available AI provider (grammar, rephrase, formal, casual, concise, expand). Falls back through enabled providers in priority order.",
        annotations(read_only_hint = true)
    )]
    async fn enhance(
        &self,
        Parameters(req): Parameters<EnhanceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let options = req.options();
        let result = self.service.enhance(&req.text, &options).await;
        Ok(ToolResponse::from_result("enhance", result).into_call_tool_result())
    }

    #[tool(
        name = "chat",
        description = "Refine text over several turns. The latest user message is rewritten with the conversation as context.",
        annotations(read_only_hint = true)
    )]
    async fn chat(&self, Parameters(req): Parameters<ChatRequest>) -> Result<CallToolResult, McpError> {
        let messages = req.messages();
        let result = self.service.chat(&messages, &req.options()).await;
        Ok(ToolResponse::from_result("chat", result).into_call_tool_result())
    }

    #[tool(
        name = "capture_and_enhance",
        description = "Copy the current selection from the focused application, then enhance it. Requires xdotool/xclip, wtype/wl-paste, or macOS osascript/pbpaste."
    )]
    async fn capture_and_enhance(
        &self,
        Parameters(req): Parameters<CaptureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.service.capture_and_enhance(&req.options()).await;
        Ok(ToolResponse::from_result("capture_and_enhance", result).into_call_tool_result())
    }

    #[tool(
        name = "get_providers",
        description = "List saved provider settings (API keys masked) in store order.",
        annotations(read_only_hint = true)
    )]
    async fn get_providers(&self) -> Result<CallToolResult, McpError> {
        let result = self.service.get_providers().await;
        Ok(ToolResponse::from_result("get_providers", result).into_call_tool_result())
    }

    #[tool(
        name = "save_provider",
        description = "Update one provider's API key, model, enabled flag, priority, or base URL. Omitted fields are unchanged."
    )]
    async fn save_provider(
        &self,
        Parameters(req): Parameters<SaveProviderRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .service
            .save_provider(req.name.as_str(), &req.update())
            .await;
        Ok(ToolResponse::from_result("save_provider", result).into_call_tool_result())
    }

    #[tool(
        name = "test_provider",
        description = "Check that one provider is reachable with its saved settings. Does not use fallback.",
        annotations(read_only_hint = true)
    )]
    async fn test_provider(
        &self,
        Parameters(req): Parameters<ProviderNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.service.test_provider(req.name.as_str()).await;
        Ok(ToolResponse::from_result("test_provider", result).into_call_tool_result())
    }
}

#[tool_handler]
impl ServerHandler for TextliftServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "textlift".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "textlift: AI text enhancement with provider fallback.\n\n\
                 1. `get_providers` shows which backends are saved and enabled.\n\
                 2. `save_provider` sets a key, model, or priority; `test_provider` checks it.\n\
                 3. `enhance` rewrites text; `chat` refines it over several turns.\n\
                 4. `capture_and_enhance` grabs the current desktop selection first.\n\n\
                 Every tool returns JSON with `status`. On error, `error.code` is one of \
                 NO_TEXT_SELECTED, TEXT_TOO_LONG, SENSITIVE_DATA, NO_PROVIDERS_AVAILABLE, \
                 ALL_PROVIDERS_FAILED (with per-provider `errors`), PROVIDER_NOT_FOUND, \
                 INVALID_CONFIG, CAPTURE_FAILED."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
