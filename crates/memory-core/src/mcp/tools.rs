//! ============================================================================
//! Tool Dispatcher - `qdrant-store` and `qdrant-find`
//! ============================================================================
//! Turns a `tools/call` into connector calls and renders the text result.
//! Failures never escape: they come back as error-flagged results.
//! ============================================================================

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::ToolSettings;
use crate::memory::QdrantConnector;
use crate::types::{Entry, Metadata, ToolError};

pub const STORE_TOOL: &str = "qdrant-store";
pub const FIND_TOOL: &str = "qdrant-find";

/// Characters of stored text echoed back in the confirmation
const PREVIEW_CHARS: usize = 100;

/// Entry in the `tools/list` response
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One content block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Result of `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent {
                kind: "text".to_string(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }

    /// Text of the first content block
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
struct StoreArgs {
    information: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct FindArgs {
    query: String,
}

/// Routes tool invocations to the connector
pub struct ToolDispatcher {
    connector: Arc<QdrantConnector>,
    search_limit: u64,
    tools: ToolSettings,
}

impl ToolDispatcher {
    pub fn new(connector: Arc<QdrantConnector>, search_limit: u64, tools: ToolSettings) -> Self {
        Self {
            connector,
            search_limit,
            tools,
        }
    }

    /// Tool descriptions advertised to clients
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: STORE_TOOL,
                description: self.tools.store_description.clone(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "information": {
                            "type": "string",
                            "description": "Text to remember"
                        },
                        "metadata": {
                            "type": "object",
                            "description": "Extra JSON metadata stored with the information"
                        }
                    },
                    "required": ["information"]
                }),
            },
            ToolDefinition {
                name: FIND_TOOL,
                description: self.tools.find_description.clone(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to search for"
                        }
                    },
                    "required": ["query"]
                }),
            },
        ]
    }

    /// Run a tool. Always returns a result; failures set `is_error`.
    pub async fn call(&self, name: &str, arguments: Option<Value>) -> CallToolResult {
        let outcome = match name {
            STORE_TOOL => match parse_args::<StoreArgs>(name, arguments) {
                Ok(args) => self.store(args.information, args.metadata).await,
                Err(e) => Err(e),
            },
            FIND_TOOL => match parse_args::<FindArgs>(name, arguments) {
                Ok(args) => self.find(&args.query).await,
                Err(e) => Err(e),
            },
            other => Err(ToolError::UnknownTool(other.to_string())),
        };

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                error!("Tool '{}' failed: {}", name, e);
                CallToolResult::error(format!("Error: {}", e))
            }
        }
    }

    /// Remember `information`, returning the confirmation text
    pub async fn store(
        &self,
        information: String,
        metadata: Option<Metadata>,
    ) -> Result<String, ToolError> {
        debug!("Storing information: {}", preview(&information, 50));

        let entry = Entry {
            content: information,
            metadata,
        };
        let id = self.connector.store(&entry).await?;

        Ok(format!(
            "Remembered: {} (ID: {})",
            preview(&entry.content, PREVIEW_CHARS),
            id
        ))
    }

    /// Search with the configured limit, returning the rendered results
    pub async fn find(&self, query: &str) -> Result<String, ToolError> {
        debug!("Finding: {}", query);

        let entries = self.connector.search(query, self.search_limit, 0.0).await?;
        Ok(render_results(query, &entries))
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Option<Value>) -> Result<T, ToolError> {
    let arguments = arguments.unwrap_or_else(|| json!({}));
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Render search results the way `qdrant-find` returns them
pub fn render_results(query: &str, entries: &[Entry]) -> String {
    if entries.is_empty() {
        return format!("No information found for the query '{}'.", query);
    }

    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(format!("Results for the query '{}'", query));
    lines.extend(entries.iter().map(format_entry));
    lines.join("\n")
}

/// Tagged text block for one entry
pub fn format_entry(entry: &Entry) -> String {
    let metadata = entry
        .stored_metadata()
        .map(|m| Value::Object(m.clone()).to_string())
        .unwrap_or_default();

    format!(
        "<entry><content>{}</content><metadata>{}</metadata></entry>",
        entry.content, metadata
    )
}

/// First `max_chars` characters, with an ellipsis when cut
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
