//! ============================================================================
//! Configuration - Environment-driven settings
//! ============================================================================
//! Read once at startup. `OPENAI_API_KEY` is required, everything else has a
//! default. Values are validated eagerly so a bad setting stops the process
//! before the MCP transport comes up.
//! ============================================================================

use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Default OpenAI-compatible API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default Qdrant endpoint (gRPC port)
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Default collection name
pub const DEFAULT_COLLECTION_NAME: &str = "mcp_memories";

/// Default number of results returned by `qdrant-find`
pub const DEFAULT_SEARCH_LIMIT: u64 = 5;

pub const DEFAULT_STORE_DESCRIPTION: &str = "Keep the memory for later use, when you are asked to remember something. \
     Takes a piece of text and optional JSON metadata, embeds it and stores it in Qdrant.";

pub const DEFAULT_FIND_DESCRIPTION: &str = "Look up memories in Qdrant. Use this tool when you need to find \
     information that was stored earlier, by semantic similarity to the query.";

/// Configuration errors (fatal at startup)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} environment variable is not set")]
    Missing { var: &'static str },

    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Embedding API settings
#[derive(Debug)]
pub struct OpenAiSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub embedding_model: String,
    /// Explicit output dimensionality, sent with every request when set
    pub dimensions: Option<u64>,
}

/// Vector database settings
#[derive(Debug)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<SecretString>,
    pub collection_name: String,
    pub search_limit: u64,
}

/// Descriptions advertised in `tools/list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub store_description: String,
    pub find_description: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            store_description: DEFAULT_STORE_DESCRIPTION.to_string(),
            find_description: DEFAULT_FIND_DESCRIPTION.to_string(),
        }
    }
}

/// Complete process configuration, immutable once loaded
#[derive(Debug)]
pub struct Config {
    pub openai: OpenAiSettings,
    pub qdrant: QdrantSettings,
    pub tools: ToolSettings,
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing {
            var: "OPENAI_API_KEY",
        })?;

        let base_url = match get("OPENAI_BASE_URL") {
            Some(raw) => parse_http_url("OPENAI_BASE_URL", &raw)?,
            None => DEFAULT_OPENAI_BASE_URL.to_string(),
        };

        let dimensions = get("OPENAI_EMBEDDING_DIMENSIONS")
            .map(|raw| parse_positive("OPENAI_EMBEDDING_DIMENSIONS", &raw))
            .transpose()?;

        let qdrant_url = match get("QDRANT_URL") {
            Some(raw) => parse_http_url("QDRANT_URL", &raw)?,
            None => DEFAULT_QDRANT_URL.to_string(),
        };

        let search_limit = match get("QDRANT_SEARCH_LIMIT") {
            Some(raw) => parse_positive("QDRANT_SEARCH_LIMIT", &raw)?,
            None => DEFAULT_SEARCH_LIMIT,
        };

        let defaults = ToolSettings::default();

        Ok(Self {
            openai: OpenAiSettings {
                api_key: SecretString::from(api_key),
                base_url,
                embedding_model: get("OPENAI_EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                dimensions,
            },
            qdrant: QdrantSettings {
                url: qdrant_url,
                api_key: get("QDRANT_API_KEY").map(SecretString::from),
                collection_name: get("QDRANT_COLLECTION_NAME")
                    .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
                search_limit,
            },
            tools: ToolSettings {
                store_description: get("TOOL_STORE_DESCRIPTION")
                    .unwrap_or(defaults.store_description),
                find_description: get("TOOL_FIND_DESCRIPTION")
                    .unwrap_or(defaults.find_description),
            },
        })
    }

    /// Redacted, log-safe description of the configuration
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![
            ("Embedding base URL", self.openai.base_url.clone()),
            ("Embedding model", self.openai.embedding_model.clone()),
            (
                "Embedding API key",
                redact(self.openai.api_key.expose_secret()),
            ),
            ("Qdrant URL", self.qdrant.url.clone()),
            (
                "Qdrant API key",
                self.qdrant
                    .api_key
                    .as_ref()
                    .map(|k| redact(k.expose_secret()))
                    .unwrap_or_else(|| "(anonymous)".to_string()),
            ),
            ("Collection", self.qdrant.collection_name.clone()),
            ("Search limit", self.qdrant.search_limit.to_string()),
        ];
        if let Some(dims) = self.openai.dimensions {
            lines.insert(2, ("Embedding dimensions", dims.to_string()));
        }
        lines
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_http_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|e| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Keep the last four characters of a key, mask the rest
fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
