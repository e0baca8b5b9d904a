//! Vector store abstraction
//!
//! Persists one embedding per (chunk, model) pair and performs brute-force
//! cosine similarity search over candidates scoped to a set of material ids
//! and one model identifier. Full-scan scoring is acceptable at the
//! material-scoped cardinalities seen per query (hundreds to low thousands
//! of chunks); a global corpus would need an indexed ANN store instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use studyforge_common::db::Repository;
use studyforge_common::errors::Result;
use tracing::debug;
use uuid::Uuid;

/// An embedding to persist
#[derive(Debug, Clone)]
pub struct EmbeddingUpsert {
    pub chunk_id: Uuid,
    pub material_id: Uuid,
    pub model: String,
    pub dims: usize,
    pub vector: Vec<f32>,
}

/// Similarity search parameters
#[derive(Debug, Clone)]
pub struct VectorSearchRequest {
    /// Candidate chunks must belong to one of these materials
    pub material_ids: Vec<Uuid>,
    /// Candidate embeddings must have been computed under this model
    pub model: String,
    pub query_vector: Vec<f32>,
    pub top_k: usize,
}

/// A scored search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,
    pub score: f32,
}

/// Trait for vector stores
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent per (chunk_id, model): a second call replaces the vector
    /// and dims.
    async fn upsert(&self, embedding: EmbeddingUpsert) -> Result<()>;

    /// Top-k candidates by cosine similarity, descending. Ties broken by
    /// chunk id ascending for reproducibility.
    async fn search(&self, request: &VectorSearchRequest) -> Result<Vec<ScoredChunk>>;
}

/// Cosine similarity, defined as 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Score candidates and keep the top k, descending by score with chunk id as
/// the deterministic tie-break
fn rank_candidates(
    candidates: impl IntoIterator<Item = (Uuid, Vec<f32>)>,
    query: &[f32],
    top_k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|(chunk_id, vector)| ScoredChunk {
            chunk_id,
            score: cosine_similarity(query, &vector),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(top_k);
    scored
}

/// Repository-backed vector store: vectors live in the embeddings table and
/// are scanned in Rust.
pub struct SqlVectorStore {
    repository: Repository,
}

impl SqlVectorStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl VectorStore for SqlVectorStore {
    async fn upsert(&self, embedding: EmbeddingUpsert) -> Result<()> {
        self.repository
            .upsert_embedding(
                embedding.chunk_id,
                &embedding.model,
                embedding.dims as i32,
                &embedding.vector,
            )
            .await
    }

    async fn search(&self, request: &VectorSearchRequest) -> Result<Vec<ScoredChunk>> {
        let rows = self
            .repository
            .embeddings_for_materials(&request.material_ids, &request.model)
            .await?;

        let candidates: Vec<(Uuid, Vec<f32>)> = rows
            .into_iter()
            .filter_map(|row| Some((row.chunk_id, row.parse_vector()?)))
            .collect();

        debug!(
            candidates = candidates.len(),
            top_k = request.top_k,
            model = %request.model,
            "Vector search scan"
        );

        Ok(rank_candidates(candidates, &request.query_vector, request.top_k))
    }
}

struct StoredEmbedding {
    material_id: Uuid,
    vector: Vec<f32>,
}

/// In-memory vector store for tests
#[derive(Default)]
pub struct InMemoryVectorStore {
    rows: RwLock<HashMap<(Uuid, String), StoredEmbedding>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, embedding: EmbeddingUpsert) -> Result<()> {
        self.rows.write().unwrap().insert(
            (embedding.chunk_id, embedding.model),
            StoredEmbedding {
                material_id: embedding.material_id,
                vector: embedding.vector,
            },
        );
        Ok(())
    }

    async fn search(&self, request: &VectorSearchRequest) -> Result<Vec<ScoredChunk>> {
        let rows = self.rows.read().unwrap();
        let candidates: Vec<(Uuid, Vec<f32>)> = rows
            .iter()
            .filter(|((_, model), stored)| {
                model == &request.model && request.material_ids.contains(&stored.material_id)
            })
            .map(|((chunk_id, _), stored)| (*chunk_id, stored.vector.clone()))
            .collect();

        Ok(rank_candidates(candidates, &request.query_vector, request.top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_self_similarity_is_one() {
        let v = vec![0.3, -0.7, 1.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_bounds() {
        let a = vec![1.0, 2.0, -3.0];
        let b = vec![-4.0, 0.5, 2.0];
        let score = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&score));

        let opposite: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &opposite) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    fn upsert(chunk_id: Uuid, material_id: Uuid, model: &str, vector: Vec<f32>) -> EmbeddingUpsert {
        EmbeddingUpsert {
            chunk_id,
            material_id,
            model: model.to_string(),
            dims: vector.len(),
            vector,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_chunk_and_model() {
        let store = InMemoryVectorStore::new();
        let chunk = Uuid::new_v4();
        let material = Uuid::new_v4();

        store.upsert(upsert(chunk, material, "m1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(upsert(chunk, material, "m1", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(store.len(), 1);

        // The latest vector wins: the query aligned with it scores 1.0
        let hits = store
            .search(&VectorSearchRequest {
                material_ids: vec![material],
                model: "m1".to_string(),
                query_vector: vec![0.0, 1.0],
                top_k: 5,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_scopes_by_material_and_model() {
        let store = InMemoryVectorStore::new();
        let wanted_material = Uuid::new_v4();
        let other_material = Uuid::new_v4();
        let in_scope = Uuid::new_v4();
        let wrong_material = Uuid::new_v4();
        let wrong_model = Uuid::new_v4();

        store.upsert(upsert(in_scope, wanted_material, "m1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(upsert(wrong_material, other_material, "m1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(upsert(wrong_model, wanted_material, "m2", vec![1.0, 0.0])).await.unwrap();

        let hits = store
            .search(&VectorSearchRequest {
                material_ids: vec![wanted_material],
                model: "m1".to_string(),
                query_vector: vec![1.0, 0.0],
                top_k: 10,
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, in_scope);
    }

    #[tokio::test]
    async fn test_search_orders_descending_and_truncates() {
        let store = InMemoryVectorStore::new();
        let material = Uuid::new_v4();
        let best = Uuid::new_v4();
        let middle = Uuid::new_v4();
        let worst = Uuid::new_v4();

        store.upsert(upsert(best, material, "m1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(upsert(middle, material, "m1", vec![1.0, 1.0])).await.unwrap();
        store.upsert(upsert(worst, material, "m1", vec![-1.0, 0.1])).await.unwrap();

        let hits = store
            .search(&VectorSearchRequest {
                material_ids: vec![material],
                model: "m1".to_string(),
                query_vector: vec![1.0, 0.0],
                top_k: 2,
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, best);
        assert_eq!(hits[1].chunk_id, middle);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_tie_break_is_deterministic() {
        let store = InMemoryVectorStore::new();
        let material = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.upsert(upsert(a, material, "m1", vec![2.0, 0.0])).await.unwrap();
        store.upsert(upsert(b, material, "m1", vec![3.0, 0.0])).await.unwrap();

        let request = VectorSearchRequest {
            material_ids: vec![material],
            model: "m1".to_string(),
            query_vector: vec![1.0, 0.0],
            top_k: 2,
        };

        let first = store.search(&request).await.unwrap();
        let second = store.search(&request).await.unwrap();
        assert_eq!(first, second);
        // Equal scores resolve by ascending chunk id
        assert_eq!(first[0].chunk_id, a.min(b));
    }
}
