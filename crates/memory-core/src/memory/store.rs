//! ============================================================================
//! Vector Store - Qdrant vector database operations
//! ============================================================================
//! `VectorBackend` is the narrow surface the connector needs from a vector
//! database. `QdrantBackend` implements it over the gRPC `qdrant-client`.
//! ============================================================================

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config::Config as VectorsConfigKind, CreateCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParams, VectorParamsBuilder,
    VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QdrantSettings;

/// Similarity metric of a named vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDistance {
    Cosine,
    Dot,
    Euclid,
    Manhattan,
    Unknown,
}

impl std::fmt::Display for VectorDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Parameters of one named vector in a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSchema {
    pub name: String,
    pub size: u64,
    pub distance: VectorDistance,
}

/// A point ready to be written
#[derive(Debug, Clone)]
pub struct NewPoint {
    pub id: Uuid,
    pub vector_name: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Similarity query against one named vector
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector_name: String,
    pub vector: Vec<f32>,
    pub limit: u64,
    /// Minimum score, `None` means no floor
    pub score_threshold: Option<f32>,
}

/// One search hit, best first
#[derive(Debug, Clone)]
pub struct ScoredPayload {
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Operations the connector needs from a vector database
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Names of all existing collections
    async fn collection_names(&self) -> Result<Vec<String>>;

    /// Named vectors of an existing collection. Unnamed (default) vectors are
    /// reported with an empty name.
    async fn collection_schema(&self, collection: &str) -> Result<Vec<VectorSchema>>;

    /// Create a collection holding a single named vector
    async fn create_collection(&self, collection: &str, schema: &VectorSchema) -> Result<()>;

    /// Write one point and wait until the store acknowledges it
    async fn upsert_point(&self, collection: &str, point: NewPoint) -> Result<()>;

    /// Ranked similarity search
    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPayload>>;
}

/// Vector backend using a Qdrant server
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Create a client for the configured Qdrant server. No request is made
    /// until the first operation.
    pub fn new(settings: &QdrantSettings) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", settings.url);

        let client = Qdrant::from_url(&settings.url)
            .api_key(
                settings
                    .api_key
                    .as_ref()
                    .map(|k| k.expose_secret().to_string()),
            )
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn collection_names(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| anyhow!("Failed to list collections: {}", e))?;

        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn collection_schema(&self, collection: &str) -> Result<Vec<VectorSchema>> {
        let response = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| anyhow!("Failed to get collection info: {}", e))?;

        let vectors = response
            .result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config);

        Ok(match vectors {
            Some(VectorsConfigKind::Params(params)) => vec![schema_from_params("", &params)],
            Some(VectorsConfigKind::ParamsMap(map)) => map
                .map
                .iter()
                .map(|(name, params)| schema_from_params(name, params))
                .collect(),
            None => vec![],
        })
    }

    async fn create_collection(&self, collection: &str, schema: &VectorSchema) -> Result<()> {
        info!(
            "Creating collection '{}': vector_name={}, vector_size={}",
            collection, schema.name, schema.size
        );

        let mut vectors_config = VectorsConfigBuilder::default();
        vectors_config.add_named_vector_params(
            schema.name.clone(),
            VectorParamsBuilder::new(schema.size, to_qdrant_distance(schema.distance)),
        );

        self.client
            .create_collection(CreateCollectionBuilder::new(collection).vectors_config(vectors_config))
            .await
            .map_err(|e| anyhow!("Failed to create collection: {}", e))?;

        info!("Collection '{}' created", collection);
        Ok(())
    }

    async fn upsert_point(&self, collection: &str, point: NewPoint) -> Result<()> {
        let payload = Payload::try_from(serde_json::Value::Object(point.payload))
            .map_err(|e| anyhow!("Failed to convert payload: {}", e))?;

        let vectors: HashMap<String, Vec<f32>> =
            [(point.vector_name, point.vector)].into_iter().collect();

        let point = PointStruct::new(point.id.to_string(), vectors, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(|e| anyhow!("Failed to upsert point: {}", e))?;

        Ok(())
    }

    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPayload>> {
        let mut request = SearchPointsBuilder::new(collection, query.vector, query.limit)
            .vector_name(query.vector_name)
            .with_payload(true);
        if let Some(threshold) = query.score_threshold {
            request = request.score_threshold(threshold);
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| anyhow!("Failed to search points: {}", e))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPayload {
                score: point.score,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }
}

fn schema_from_params(name: &str, params: &VectorParams) -> VectorSchema {
    VectorSchema {
        name: name.to_string(),
        size: params.size,
        distance: from_qdrant_distance(params.distance),
    }
}

fn to_qdrant_distance(distance: VectorDistance) -> Distance {
    match distance {
        VectorDistance::Dot => Distance::Dot,
        VectorDistance::Euclid => Distance::Euclid,
        VectorDistance::Manhattan => Distance::Manhattan,
        VectorDistance::Cosine | VectorDistance::Unknown => Distance::Cosine,
    }
}

fn from_qdrant_distance(raw: i32) -> VectorDistance {
    match Distance::try_from(raw) {
        Ok(Distance::Cosine) => VectorDistance::Cosine,
        Ok(Distance::Dot) => VectorDistance::Dot,
        Ok(Distance::Euclid) => VectorDistance::Euclid,
        Ok(Distance::Manhattan) => VectorDistance::Manhattan,
        _ => VectorDistance::Unknown,
    }
}

// Qdrant payload values back into plain JSON
fn payload_to_json(payload: HashMap<String, Value>) -> serde_json::Map<String, serde_json::Value> {
    payload
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect()
}
