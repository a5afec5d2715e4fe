//! ============================================================================
//! Qdrant Connector - Orchestrates memory storage and retrieval
//! ============================================================================
//! Every `store` / `search` first makes sure the collection exists, then
//! embeds the text and talks to the vector backend. Nothing is retried.
//! ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::embeddings::EmbeddingProvider;
use super::store::{NewPoint, VectorBackend, VectorDistance, VectorQuery, VectorSchema};
use crate::types::Entry;

/// Payload key holding the stored text
pub const CONTENT_KEY: &str = "content";

/// Payload key holding the optional metadata object
pub const METADATA_KEY: &str = "metadata";

/// Connector combining an embedding provider with a vector backend
pub struct QdrantConnector {
    backend: Arc<dyn VectorBackend>,
    embeddings: Arc<dyn EmbeddingProvider>,
    collection_name: String,
    ensured: AtomicBool,
}

impl QdrantConnector {
    /// Create a connector for `collection_name`. The collection is not
    /// touched until the first store or search.
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embeddings: Arc<dyn EmbeddingProvider>,
        collection_name: impl Into<String>,
    ) -> Self {
        let collection_name = collection_name.into();
        info!("Qdrant connector ready: collection={}", collection_name);

        Self {
            backend,
            embeddings,
            collection_name,
            ensured: AtomicBool::new(false),
        }
    }

    /// Name of the backing collection
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Vector parameters every point in the collection must use
    pub fn expected_schema(&self) -> VectorSchema {
        VectorSchema {
            name: self.embeddings.vector_name(),
            size: self.embeddings.vector_size(),
            distance: VectorDistance::Cosine,
        }
    }

    /// Make sure the collection exists, creating it on demand.
    ///
    /// An existing collection must carry the provider's named vector with the
    /// same size and cosine distance, otherwise this fails instead of letting
    /// writes and searches go to a mismatched index.
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.ensured.load(Ordering::Acquire) {
            return Ok(());
        }

        let expected = self.expected_schema();
        let names = self.backend.collection_names().await.map_err(|e| {
            warn!("Failed to check collection '{}': {}", self.collection_name, e);
            e
        })?;

        if names.iter().any(|n| n == &self.collection_name) {
            debug!("Collection '{}' already exists", self.collection_name);
            let schema = self.backend.collection_schema(&self.collection_name).await?;
            validate_schema(&self.collection_name, &expected, &schema)?;
        } else {
            self.backend
                .create_collection(&self.collection_name, &expected)
                .await?;
        }

        self.ensured.store(true, Ordering::Release);
        Ok(())
    }

    /// Embed and persist an entry, returning the new point id.
    ///
    /// Storing the same content twice yields two points.
    pub async fn store(&self, entry: &Entry) -> Result<Uuid> {
        self.ensure_collection().await?;

        let vector = self.embeddings.embed_query(&entry.content).await?;
        let id = Uuid::new_v4();

        let mut payload = serde_json::Map::new();
        payload.insert(CONTENT_KEY.to_string(), Value::String(entry.content.clone()));
        if let Some(metadata) = entry.stored_metadata() {
            payload.insert(METADATA_KEY.to_string(), Value::Object(metadata.clone()));
        }

        self.backend
            .upsert_point(
                &self.collection_name,
                NewPoint {
                    id,
                    vector_name: self.embeddings.vector_name(),
                    vector,
                    payload,
                },
            )
            .await?;

        info!("Stored entry {} in '{}'", id, self.collection_name);
        Ok(id)
    }

    /// Find entries similar to `query`, best match first.
    ///
    /// A `score_threshold` of exactly zero applies no floor. Negative values
    /// are real floors since cosine scores range over [-1, 1].
    pub async fn search(
        &self,
        query: &str,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<Entry>> {
        if limit == 0 {
            return Err(anyhow!("Search limit must be greater than zero"));
        }

        self.ensure_collection().await?;

        let vector = self.embeddings.embed_query(query).await?;
        let hits = self
            .backend
            .search(
                &self.collection_name,
                VectorQuery {
                    vector_name: self.embeddings.vector_name(),
                    vector,
                    limit,
                    score_threshold: (score_threshold != 0.0).then_some(score_threshold),
                },
            )
            .await?;

        let entries: Vec<Entry> = hits
            .into_iter()
            .map(|hit| entry_from_payload(hit.payload))
            .collect();

        debug!(
            "Search in '{}' returned {} entries",
            self.collection_name,
            entries.len()
        );
        Ok(entries)
    }
}

fn validate_schema(collection: &str, expected: &VectorSchema, actual: &[VectorSchema]) -> Result<()> {
    let found = actual.iter().find(|s| s.name == expected.name).ok_or_else(|| {
        let names: Vec<&str> = actual.iter().map(|s| s.name.as_str()).collect();
        anyhow!(
            "Collection '{}' has no vector named '{}' (found: [{}]); it was created for a different embedding model",
            collection,
            expected.name,
            names.join(", ")
        )
    })?;

    if found.size != expected.size || found.distance != expected.distance {
        return Err(anyhow!(
            "Collection '{}' vector '{}' is {}-dimensional with {} distance, but the embedding provider needs {}-dimensional {}",
            collection,
            expected.name,
            found.size,
            found.distance,
            expected.size,
            expected.distance
        ));
    }

    Ok(())
}

fn entry_from_payload(mut payload: serde_json::Map<String, Value>) -> Entry {
    let content = match payload.remove(CONTENT_KEY) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };

    let metadata = match payload.remove(METADATA_KEY) {
        Some(Value::Object(map)) => Some(map),
        None | Some(Value::Null) => None,
        Some(other) => {
            warn!("Ignoring non-object metadata in search result: {}", other);
            None
        }
    };

    Entry { content, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbeddings, InMemoryBackend};
    use crate::types::Metadata;
    use serde_json::json;

    fn connector(
        backend: Arc<InMemoryBackend>,
        embeddings: Arc<FakeEmbeddings>,
    ) -> QdrantConnector {
        QdrantConnector::new(backend, embeddings, "test_memories")
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let embeddings = Arc::new(FakeEmbeddings::new("text-embedding-3-small"));
        let connector = connector(backend.clone(), embeddings.clone());

        connector.ensure_collection().await.unwrap();
        connector.ensure_collection().await.unwrap();

        assert_eq!(backend.create_calls(), 1);
        assert_eq!(
            backend.schema_of("test_memories"),
            Some(VectorSchema {
                name: "text_embedding_3_small".to_string(),
                size: embeddings.vector_size(),
                distance: VectorDistance::Cosine,
            })
        );
    }

    #[tokio::test]
    async fn test_existing_collection_is_not_recreated() {
        let backend = Arc::new(InMemoryBackend::new());
        let embeddings = Arc::new(FakeEmbeddings::new("text-embedding-3-small"));

        connector(backend.clone(), embeddings.clone())
            .ensure_collection()
            .await
            .unwrap();
        // A fresh process sees the collection through list_collections
        connector(backend.clone(), embeddings)
            .ensure_collection()
            .await
            .unwrap();

        assert_eq!(backend.create_calls(), 1);
        assert_eq!(backend.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_schema_mismatch_fails_loudly() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_collection(
            "test_memories",
            VectorSchema {
                name: "text_embedding_3_small".to_string(),
                size: 3,
                distance: VectorDistance::Cosine,
            },
        );

        let embeddings = Arc::new(FakeEmbeddings::new("text-embedding-3-small"));
        let connector = connector(backend.clone(), embeddings);

        let err = connector.ensure_collection().await.unwrap_err().to_string();
        assert!(err.contains("3-dimensional"), "{}", err);
        assert_eq!(backend.create_calls(), 0);

        // Not cached: the next call checks again
        assert!(connector.ensure_collection().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_vector_name_fails() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_collection(
            "test_memories",
            VectorSchema {
                name: "other_model".to_string(),
                size: FakeEmbeddings::DIM,
                distance: VectorDistance::Cosine,
            },
        );

        let connector = connector(backend, Arc::new(FakeEmbeddings::new("text-embedding-3-small")));
        let err = connector.ensure_collection().await.unwrap_err().to_string();
        assert!(err.contains("other_model"), "{}", err);
    }

    #[tokio::test]
    async fn test_store_then_search_round_trip() {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = connector(backend, Arc::new(FakeEmbeddings::new("text-embedding-3-small")));

        let mut metadata = Metadata::new();
        metadata.insert("topic".to_string(), json!("rust"));
        let entry = Entry::new("Rust has a borrow checker").with_metadata(metadata.clone());

        connector.store(&entry).await.unwrap();
        connector
            .store(&Entry::new("Paris is the capital of France"))
            .await
            .unwrap();

        let results = connector.search(&entry.content, 10, 0.0).await.unwrap();
        assert_eq!(results[0].content, entry.content);
        assert_eq!(results[0].metadata, Some(metadata));
    }

    #[tokio::test]
    async fn test_store_twice_creates_two_points() {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = connector(backend.clone(), Arc::new(FakeEmbeddings::new("text-embedding-3-small")));
        let entry = Entry::new("duplicate me");

        let first = connector.store(&entry).await.unwrap();
        let second = connector.store(&entry).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(backend.point_count("test_memories"), 2);

        let results = connector.search("duplicate me", 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|e| e.content == "duplicate me"));
    }

    #[tokio::test]
    async fn test_payload_omits_absent_metadata() {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = connector(backend.clone(), Arc::new(FakeEmbeddings::new("text-embedding-3-small")));

        connector.store(&Entry::new("no metadata here")).await.unwrap();
        connector
            .store(&Entry::new("empty metadata").with_metadata(Metadata::new()))
            .await
            .unwrap();

        for payload in backend.payloads("test_memories") {
            assert!(!payload.contains_key(METADATA_KEY), "{:?}", payload);
            assert!(payload.contains_key(CONTENT_KEY));
        }
    }

    #[tokio::test]
    async fn test_search_empty_collection_returns_nothing() {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = connector(backend, Arc::new(FakeEmbeddings::new("text-embedding-3-small")));

        let results = connector.search("anything", 5, 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_threshold() {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = connector(backend, Arc::new(FakeEmbeddings::new("text-embedding-3-small")));

        for text in ["alpha beta", "alpha gamma", "alpha delta", "zeta eta"] {
            connector.store(&Entry::new(text)).await.unwrap();
        }

        assert_eq!(connector.search("alpha", 2, 0.0).await.unwrap().len(), 2);

        let strict = connector.search("alpha beta", 10, 0.99).await.unwrap();
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].content, "alpha beta");

        assert!(connector.search("alpha", 0, 0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_negative_threshold_is_a_real_floor() {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = connector(backend.clone(), Arc::new(FakeEmbeddings::new("text-embedding-3-small")));

        connector.search("q", 5, 0.0).await.unwrap();
        connector.search("q", 5, -0.5).await.unwrap();
        connector.search("q", 5, 0.25).await.unwrap();

        assert_eq!(
            backend.received_thresholds(),
            vec![None, Some(-0.5), Some(0.25)]
        );
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates_without_write() {
        let backend = Arc::new(InMemoryBackend::new());
        let embeddings = Arc::new(FakeEmbeddings::new("text-embedding-3-small"));
        embeddings.fail_with("rate limited");
        let connector = connector(backend.clone(), embeddings);

        let err = connector.store(&Entry::new("lost")).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(backend.point_count("test_memories"), 0);
    }

    #[test]
    fn test_entry_from_payload_defaults() {
        let entry = entry_from_payload(serde_json::Map::new());
        assert_eq!(entry, Entry::new(""));

        let payload = json!({ "content": "x", "metadata": ["not", "an", "object"] });
        let entry = entry_from_payload(payload.as_object().unwrap().clone());
        assert_eq!(entry.content, "x");
        assert!(entry.metadata.is_none());
    }
}
