//! Test doubles for the embedding provider and the vector backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::memory::{
    vector_name_for_model, EmbeddingProvider, NewPoint, ScoredPayload, VectorBackend, VectorQuery,
    VectorSchema,
};

/// Deterministic bag-of-words embedder. Texts sharing words get similar
/// vectors; identical texts get identical vectors.
pub struct FakeEmbeddings {
    model: String,
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl FakeEmbeddings {
    pub const DIM: u64 = 256;

    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Make every following call fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Number of (simulated) API requests made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; Self::DIM as usize];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) % Self::DIM;
            vector[bucket as usize] += 1.0;
        }
        vector
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().unwrap().as_ref() {
            return Err(anyhow!("Embedding API error: {}", message));
        }
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddings {
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }
        self.request(documents)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.request(&[query.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    fn vector_name(&self) -> String {
        vector_name_for_model(&self.model)
    }

    fn vector_size(&self) -> u64 {
        Self::DIM
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325_u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

struct Collection {
    schema: VectorSchema,
    points: Vec<NewPoint>,
}

/// Vector backend kept in process memory, ranking by cosine similarity
#[derive(Default)]
pub struct InMemoryBackend {
    collections: Mutex<HashMap<String, Collection>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    thresholds: Mutex<Vec<Option<f32>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a collection, as if another process had made it
    pub fn add_collection(&self, name: &str, schema: VectorSchema) {
        self.collections.lock().unwrap().insert(
            name.to_string(),
            Collection {
                schema,
                points: Vec::new(),
            },
        );
    }

    pub fn schema_of(&self, name: &str) -> Option<VectorSchema> {
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.schema.clone())
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |c| c.points.len())
    }

    pub fn payloads(&self, name: &str) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.points.iter().map(|p| p.payload.clone()).collect())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Score thresholds of every search received, in call order
    pub fn received_thresholds(&self) -> Vec<Option<f32>> {
        self.thresholds.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn collection_names(&self) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn collection_schema(&self, collection: &str) -> Result<Vec<VectorSchema>> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| vec![c.schema.clone()])
            .ok_or_else(|| anyhow!("Not found: Collection `{}` doesn't exist!", collection))
    }

    async fn create_collection(&self, collection: &str, schema: &VectorSchema) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(collection) {
            return Err(anyhow!("Collection `{}` already exists!", collection));
        }
        collections.insert(
            collection.to_string(),
            Collection {
                schema: schema.clone(),
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert_point(&self, collection: &str, point: NewPoint) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("Not found: Collection `{}` doesn't exist!", collection))?;

        if point.vector_name != target.schema.name
            || point.vector.len() as u64 != target.schema.size
        {
            return Err(anyhow!("Wrong input: vector does not match collection schema"));
        }

        target.points.retain(|p| p.id != point.id);
        target.points.push(point);
        Ok(())
    }

    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPayload>> {
        self.thresholds.lock().unwrap().push(query.score_threshold);
        let collections = self.collections.lock().unwrap();
        let target = collections
            .get(collection)
            .ok_or_else(|| anyhow!("Not found: Collection `{}` doesn't exist!", collection))?;

        if query.vector_name != target.schema.name {
            return Err(anyhow!("Wrong input: Not existing vector name: {}", query.vector_name));
        }

        let mut hits: Vec<ScoredPayload> = target
            .points
            .iter()
            .map(|p| ScoredPayload {
                score: cosine(&query.vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| query.score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit as usize);
        Ok(hits)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
