//! ============================================================================
//! MCP Module - Model Context Protocol surface
//! ============================================================================
//! - `rpc`: JSON-RPC 2.0 envelopes
//! - `tools`: the `qdrant-store` / `qdrant-find` dispatcher
//! - `server`: stdio transport loop
//! ============================================================================

pub mod rpc;
mod server;
mod tools;

pub use server::{McpServer, DEFAULT_PROTOCOL_VERSION, SERVER_NAME};
pub use tools::{
    format_entry, render_results, CallToolResult, ToolContent, ToolDefinition, ToolDispatcher,
    FIND_TOOL, STORE_TOOL,
};
