//! ============================================================================
//! Memory Module - Semantic memory backed by Qdrant
//! ============================================================================
//! Stores text as vector points and finds it again by similarity.
//!
//! ## Architecture
//! ```text
//! Entry ──► EmbeddingProvider::embed_query ──► vector
//!                                                │
//!            QdrantConnector::ensure_collection  ▼
//!                    │                 VectorBackend::upsert_point / search
//!                    ▼                           │
//!            list / validate / create            ▼
//!                                       Qdrant (named vector, cosine)
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use memory_core::memory::{create_embedding_provider, QdrantBackend, QdrantConnector};
//!
//! let embeddings = Arc::new(create_embedding_provider(&config.openai));
//! let backend = Arc::new(QdrantBackend::new(&config.qdrant)?);
//! let connector = QdrantConnector::new(backend, embeddings, "mcp_memories");
//!
//! let id = connector.store(&Entry::new("User prefers concise answers")).await?;
//! let hits = connector.search("how should I answer", 5, 0.0).await?;
//! ```
//! ============================================================================

mod connector;
mod embeddings;
mod store;

pub use connector::{QdrantConnector, CONTENT_KEY, METADATA_KEY};
pub use embeddings::{
    create_embedding_provider, known_dimensions, vector_name_for_model, EmbeddingProvider,
    OpenAiEmbeddingProvider, DEFAULT_EMBEDDING_DIM,
};
pub use store::{
    NewPoint, QdrantBackend, ScoredPayload, VectorBackend, VectorDistance, VectorQuery,
    VectorSchema,
};
