//! ============================================================================
//! MEMORY-CORE: Semantic memory for MCP clients
//! ============================================================================
//! This crate holds everything behind the `mcp-server-qdrant` binary:
//! - Environment configuration with fail-fast validation
//! - OpenAI-compatible embedding provider
//! - Qdrant connector (collection bootstrap, store, search)
//! - MCP tool dispatcher and stdio JSON-RPC server
//! ============================================================================

pub mod config;
pub mod mcp;
pub mod memory;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{Config, ConfigError};
pub use mcp::{McpServer, ToolDispatcher};
pub use memory::{EmbeddingProvider, QdrantBackend, QdrantConnector, VectorBackend};
pub use types::{Entry, Metadata, ToolError};
