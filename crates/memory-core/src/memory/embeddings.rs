//! ============================================================================
//! Embedding Provider - Text to vector via an OpenAI-compatible API
//! ============================================================================
//! One batched `POST {base_url}/embeddings` per call. No retries: any
//! transport or API failure fails the whole batch.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::OpenAiSettings;

/// Dimensionality assumed for models missing from `KNOWN_MODELS`
pub const DEFAULT_EMBEDDING_DIM: u64 = 1536;

/// Output sizes of well-known OpenAI embedding models
const KNOWN_MODELS: &[(&str, u64)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Anything that turns text into fixed-size vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed documents in one batch, output order matches input order
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;

    /// Name of the named vector this provider's output lives under
    fn vector_name(&self) -> String;

    /// Dimensionality of the produced vectors
    fn vector_size(&self) -> u64;
}

/// Normalize a model identifier into a Qdrant vector name
pub fn vector_name_for_model(model: &str) -> String {
    model.replace(['/', '-'], "_")
}

/// Static dimensionality lookup for a model identifier
pub fn known_dimensions(model: &str) -> Option<u64> {
    KNOWN_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dim)| *dim)
}

/// Embedding provider for OpenAI and OpenAI-compatible servers
pub struct OpenAiEmbeddingProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    dimensions: Option<u64>,
    vector_size: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: Option<String>,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiEmbeddingProvider {
    /// Create a provider for `model` served at `base_url`
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<u64>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();

        let vector_size = match (dimensions, known_dimensions(&model)) {
            (Some(dims), _) => dims,
            (None, Some(dims)) => dims,
            (None, None) => {
                warn!(
                    "Unknown embedding model '{}', assuming {} dimensions (set OPENAI_EMBEDDING_DIMENSIONS to override)",
                    model, DEFAULT_EMBEDDING_DIM
                );
                DEFAULT_EMBEDDING_DIM
            }
        };

        info!(
            "Embedding provider ready: model={}, base_url={}, vector_size={}",
            model, base_url, vector_size
        );

        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
            dimensions,
            vector_size,
        }
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!(
                    "Embedding API error ({}): {}",
                    status,
                    error.error.message
                ));
            }
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse embedding response: {}", e))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Embedding tokens used: {} (model: {})",
                usage.total_tokens,
                parsed.model.as_deref().unwrap_or(&self.model)
            );
        }

        if parsed.data.len() != input.len() {
            return Err(anyhow!(
                "Embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                input.len()
            ));
        }

        let mut embeddings: Vec<(usize, Vec<f32>)> = parsed
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        // Each input position must be covered exactly once
        if let Some((expected, (idx, _))) = embeddings
            .iter()
            .enumerate()
            .find(|(expected, (idx, _))| idx != expected)
        {
            return Err(anyhow!(
                "Embedding API returned index {} where {} was expected",
                idx,
                expected
            ));
        }

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding {} documents", documents.len());
        self.request(documents).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        debug!("Embedding query ({} chars)", query.chars().count());

        self.request(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    fn vector_name(&self) -> String {
        vector_name_for_model(&self.model)
    }

    fn vector_size(&self) -> u64 {
        self.vector_size
    }
}

/// Build the configured embedding provider
pub fn create_embedding_provider(settings: &OpenAiSettings) -> OpenAiEmbeddingProvider {
    OpenAiEmbeddingProvider::new(
        SecretString::from(settings.api_key.expose_secret().to_string()),
        settings.base_url.clone(),
        settings.embedding_model.clone(),
        settings.dimensions,
    )
}
