//! ============================================================================
//! MCP Server - Newline-delimited JSON-RPC over stdio
//! ============================================================================
//! Each incoming line is one message. Requests run concurrently on their own
//! task; each response is written as a single line once it is ready. stdout
//! carries protocol frames only, logs go to stderr.
//! ============================================================================

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::tools::ToolDispatcher;

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "mcp-server-qdrant";

/// Protocol revision used when the client does not ask for one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// MCP server exposing the memory tools
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<ToolDispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve on the process's stdin / stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve on arbitrary streams until `reader` reaches EOF. In-flight
    /// requests are drained before returning.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut in_flight: JoinSet<Option<JsonRpcResponse>> = JoinSet::new();

        info!("MCP server listening on stdio");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.map_err(|e| anyhow!("Failed to read from transport: {}", e))? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let server = self.clone();
                    in_flight.spawn(async move { server.handle_line(&line).await });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    write_joined(&mut writer, joined).await?;
                }
            }
        }

        debug!("Transport closed, draining {} in-flight requests", in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            write_joined(&mut writer, joined).await?;
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Handle one raw line, returning the response to send (if any)
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparseable message: {}", e);
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::parse_error(format!("Parse error: {}", e)),
                ));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
                ));
            }
        };

        self.handle_request(request).await
    }

    /// Handle a decoded request. Notifications never produce a response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Received {}", request.method);

        let Some(id) = request.id.clone() else {
            debug!("Notification {} acknowledged", request.method);
            return None;
        };

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize(request.params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.dispatcher.definitions() })),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        if let Some(client) = params.and_then(|p| p.get("clientInfo")) {
            info!("Client connected: {}", client);
        }

        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing params for tools/call"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::invalid_params(format!("Invalid params for tools/call: {}", e))
                })
            })?;

        info!("Calling tool '{}'", params.name);
        let result = self.dispatcher.call(&params.name, params.arguments).await;

        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::internal_error(format!("Failed to encode result: {}", e)))
    }
}

async fn write_joined<W: AsyncWrite + Unpin>(
    writer: &mut W,
    joined: std::result::Result<Option<JsonRpcResponse>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(Some(response)) => write_response(writer, &response).await,
        Ok(None) => Ok(()),
        Err(e) => {
            error!("Request handler panicked: {}", e);
            Ok(())
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let mut frame = serde_json::to_vec(response)
        .map_err(|e| anyhow!("Failed to encode response: {}", e))?;
    frame.push(b'\n');

    writer
        .write_all(&frame)
        .await
        .map_err(|e| anyhow!("Failed to write to transport: {}", e))?;
    writer
        .flush()
        .await
        .map_err(|e| anyhow!("Failed to flush transport: {}", e))?;
    Ok(())
}
