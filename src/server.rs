//! MCP Server implementation
//!
//! Exposes the [`Gateway`] operations as MCP tools and the chat conversation
//! as an MCP prompt. Connection details travel with every call; the server
//! itself holds no per-host state beyond the optional session pool.

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::ErrorReport;
use crate::gateway::Gateway;
use crate::prompt::build_conversation;
use crate::ssh::{Connector, SessionEstablisher};
use crate::tools::{
    ChatPromptParams, ExecuteParams, HostParams, ListDirectoryParams, ReadFileParams,
    CHAT_PROMPT, DISK_USAGE_TOOL, EXECUTE_TOOL, LIST_DIRECTORY_TOOL, READ_FILE_TOOL,
    SYSTEM_INFO_TOOL,
};

/// Linux VM admin MCP server
pub struct AdminServer<C = SessionEstablisher> {
    /// Shared execution pipeline
    gateway: Arc<Gateway<C>>,
}

// Manual impl: `C` itself need not be Clone
impl<C> Clone for AdminServer<C> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<C: Connector + 'static> AdminServer<C> {
    pub fn new(gateway: Gateway<C>) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway<C>> {
        &self.gateway
    }

    /// Close the server and cleanup resources
    pub async fn shutdown(&self) {
        info!("Shutting down Linux VM admin server...");
        self.gateway.shutdown().await;
    }

    /// Route a tool call by name
    pub async fn dispatch(
        &self,
        tool_name: &str,
        args: JsonObject,
    ) -> Result<CallToolResult, McpError> {
        debug!("call_tool called: {:?}", tool_name);

        let gateway = &self.gateway;
        let outcome = match tool_name {
            EXECUTE_TOOL => {
                let params: ExecuteParams = parse_args(args)?;
                gateway.execute(&params.command, &params.connection).await
            }
            READ_FILE_TOOL => {
                let params: ReadFileParams = parse_args(args)?;
                gateway.read_file(&params.file_path, &params.connection).await
            }
            DISK_USAGE_TOOL => {
                let params: HostParams = parse_args(args)?;
                gateway.disk_usage(&params.connection).await
            }
            LIST_DIRECTORY_TOOL => {
                let params: ListDirectoryParams = parse_args(args)?;
                gateway
                    .list_directory(params.path.as_deref(), &params.connection)
                    .await
            }
            SYSTEM_INFO_TOOL => {
                let params: HostParams = parse_args(args)?;
                gateway.system_info(&params.connection).await
            }
            _ => {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {}", tool_name),
                    None,
                ))
            }
        };

        match outcome {
            Ok(output) => Ok(CallToolResult::success(vec![Content::text(output)])),
            Err(report) => report_result(report),
        }
    }

    /// Render a prompt by name
    pub fn render_prompt(
        &self,
        prompt_name: &str,
        args: JsonObject,
    ) -> Result<GetPromptResult, McpError> {
        if prompt_name != CHAT_PROMPT {
            return Err(McpError::invalid_params(
                format!("Unknown prompt: {}", prompt_name),
                None,
            ));
        }

        let params: ChatPromptParams = parse_args(args)?;
        debug!(
            "Rendering {} for {}@{}",
            CHAT_PROMPT, params.connection.username, params.connection.host
        );

        // MCP prompts have no system role; the instruction leads as a user turn
        let messages = build_conversation(&params.query)
            .into_iter()
            .map(|message| PromptMessage::new_text(PromptMessageRole::User, message.text))
            .collect();

        Ok(GetPromptResult {
            description: Some(format!(
                "Administer {}@{} in natural language",
                params.connection.username, params.connection.host
            )),
            messages,
        })
    }
}

/// Tool error carrying the report text and its `{kind, message}` form
fn report_result(report: ErrorReport) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![
        Content::text(report.message.clone()),
        Content::json(&report)?,
    ]))
}

fn parse_args<T: DeserializeOwned>(args: JsonObject) -> Result<T, McpError> {
    serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {}", e), None))
}

/// JSON schema object for a parameter type
fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    Arc::new(schema.as_object().cloned().unwrap_or_default())
}

fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            EXECUTE_TOOL,
            "Execute a shell command on a Linux machine over SSH and return its output. \
             Provide the host, username, and either a password or a private_key_path.",
            input_schema::<ExecuteParams>(),
        ),
        Tool::new(
            READ_FILE_TOOL,
            "Read the content of a file on a Linux machine.",
            input_schema::<ReadFileParams>(),
        ),
        Tool::new(
            DISK_USAGE_TOOL,
            "Show disk usage of a Linux machine (df -h).",
            input_schema::<HostParams>(),
        ),
        Tool::new(
            LIST_DIRECTORY_TOOL,
            "List the contents of a directory on a Linux machine (ls -l). Defaults to the login directory.",
            input_schema::<ListDirectoryParams>(),
        ),
        Tool::new(
            SYSTEM_INFO_TOOL,
            "Show basic system information of a Linux machine: kernel and OS release.",
            input_schema::<HostParams>(),
        ),
    ]
}

fn prompt_argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(required),
    }
}

fn prompt_definition() -> Prompt {
    Prompt::new(
        CHAT_PROMPT,
        Some(
            "Interact with a specific Linux machine in natural language. \
             Provide the host, username, and either a password or a private_key_path.",
        ),
        Some(vec![
            prompt_argument("query", "Question or request about the machine", true),
            prompt_argument("host", "Hostname or IP address", true),
            prompt_argument("username", "Login user", true),
            prompt_argument("password", "Password for password authentication", false),
            prompt_argument("private_key_path", "Path to a private key file", false),
        ]),
    )
}

impl<C: Connector + 'static> ServerHandler for AdminServer<C> {
    /// Return server information
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Linux VM admin v{} - Run administration commands on Linux hosts over SSH. \
                 Every tool takes host, username and a password or private_key_path.",
                env!("CARGO_PKG_VERSION"),
            )),
        }
    }

    /// List available tools
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        debug!("list_tools called");

        Ok(ListToolsResult {
            tools: tool_definitions(),
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Call a tool
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        self.dispatch(request.name.as_ref(), args).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        debug!("list_prompts called");

        Ok(ListPromptsResult {
            prompts: vec![prompt_definition()],
            next_cursor: None,
            meta: Default::default(),
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        self.render_prompt(&request.name, args)
    }
}
