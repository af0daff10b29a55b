//! MCP server over stdio
//!
//! Reads newline-delimited JSON-RPC from stdin and writes responses to
//! stdout. Tool and resource calls are routed to the handler that declared
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{McpError, Result, WorkspaceMcpError};
use crate::mcp::tools::ServiceHandler;
use crate::mcp::types::*;

const SERVER_NAME: &str = "google-workspace";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer {
    handlers: Vec<Arc<dyn ServiceHandler>>,

    /// Tool name to handler index
    tools: HashMap<String, usize>,

    /// Resource URI to handler index
    resources: HashMap<String, usize>,

    initialized: bool,
}

impl McpServer {
    pub fn new(handlers: Vec<Arc<dyn ServiceHandler>>) -> Self {
        let mut tools = HashMap::new();
        let mut resources = HashMap::new();

        for (index, handler) in handlers.iter().enumerate() {
            for tool in handler.tools() {
                if tools.insert(tool.name.clone(), index).is_some() {
                    tracing::warn!("Tool {} declared twice; last one wins", tool.name);
                }
            }
            for resource in handler.resources() {
                resources.insert(resource.uri, index);
            }
        }

        tracing::debug!(
            "MCP server ready with {} tools and {} resources",
            tools.len(),
            resources.len()
        );

        Self {
            handlers,
            tools,
            resources,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Serve until stdin closes
    pub async fn run_stdio(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match self.handle_message(&line).await {
                Ok(Some(response)) => {
                    let mut out = serde_json::to_string(&response)?;
                    out.push('\n');
                    stdout.write_all(out.as_bytes()).await?;
                    stdout.flush().await?;
                }
                Ok(None) => {}
                Err(e) => tracing::error!("Error handling message: {}", e),
            }
        }

        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one JSON-RPC message; notifications produce no response
    pub async fn handle_message(&mut self, message: &str) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                return Ok(Some(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(e.to_string()),
                )));
            }
        };

        if request.method == methods::INITIALIZED {
            self.initialized = true;
            return Ok(None);
        }

        let Some(id) = request.id.clone() else {
            tracing::debug!("Ignoring notification {}", request.method);
            return Ok(None);
        };

        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(),
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => self.handle_list_tools(),
            methods::CALL_TOOL => self.handle_call_tool(request.params).await,
            methods::LIST_RESOURCES => self.handle_list_resources(),
            methods::READ_RESOURCE => self.handle_read_resource(request.params).await,
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        Ok(Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }))
    }

    fn handle_initialize(&self) -> std::result::Result<Value, JsonRpcError> {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
                resources: Some(ResourcesCapability::default()),
            },
        };
        to_result(result)
    }

    fn handle_list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        let tools = self.handlers.iter().flat_map(|h| h.tools()).collect();
        to_result(ListToolsResult { tools })
    }

    /// Tool failures are reported in the result, not as JSON-RPC errors
    async fn handle_call_tool(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e)))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool parameters")),
        };

        let result = match self.tools.get(&params.name) {
            Some(&index) => {
                tracing::debug!("Calling tool {}", params.name);
                match self.handlers[index].call_tool(&params.name, params.arguments).await {
                    Ok(value) => match serde_json::to_string_pretty(&value) {
                        Ok(text) => CallToolResult::text(text),
                        Err(e) => CallToolResult::error(e.to_string()),
                    },
                    Err(e) => {
                        tracing::warn!("Tool {} failed: {}", params.name, e);
                        CallToolResult::error(e.to_string())
                    }
                }
            }
            None => CallToolResult::error(
                WorkspaceMcpError::Mcp(McpError::UnknownTool { name: params.name }).to_string(),
            ),
        };

        to_result(result)
    }

    fn handle_list_resources(&self) -> std::result::Result<Value, JsonRpcError> {
        let resources = self.handlers.iter().flat_map(|h| h.resources()).collect();
        to_result(ListResourcesResult { resources })
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: ReadResourceParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing resource parameters"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid resource parameters: {}", e)))
            })?;

        let Some(&index) = self.resources.get(&params.uri) else {
            return Err(JsonRpcError::invalid_params(
                WorkspaceMcpError::Mcp(McpError::UnknownResource { uri: params.uri }).to_string(),
            ));
        };

        let value = self.handlers[index]
            .read_resource(&params.uri)
            .await
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;

        to_result(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: Some("application/json".to_string()),
                text,
            }],
        })
    }
}

fn to_result<T: serde::Serialize>(result: T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
