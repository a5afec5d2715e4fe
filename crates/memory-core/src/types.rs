//! ============================================================================
//! Types - Shared data structures for mcp-server-qdrant
//! ============================================================================
//! Memory entries, free-form metadata and the errors surfaced to MCP callers.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Free-form metadata attached to an entry (any JSON object)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A single piece of remembered information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The text that gets embedded and stored
    pub content: String,
    /// Optional metadata stored next to the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Entry {
    /// Create an entry without metadata
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    /// Attach metadata to the entry
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Metadata worth persisting: `None` when absent or empty
    pub fn stored_metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref().filter(|m| !m.is_empty())
    }
}

/// Errors returned from a tool invocation.
///
/// These never cross the protocol boundary as JSON-RPC errors; the dispatcher
/// renders them into an error-flagged tool result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
