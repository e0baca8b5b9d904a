//! Retrieval layer
//!
//! Embeds a query, searches the vector store, and hydrates the ranked chunk
//! ids into full chunk + material records without disturbing the ranking.

use crate::store::{ScoredChunk, VectorSearchRequest, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use studyforge_common::db::{HydratedChunk, Repository};
use studyforge_common::embeddings::Embedder;
use studyforge_common::errors::Result;
use studyforge_common::metrics::Timer;
use tracing::debug;
use uuid::Uuid;

/// A retrieved chunk with its material context and similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub material_id: Uuid,
    pub material_title: String,
    pub content: String,
    pub chunk_index: i32,
    pub page_start: i32,
    pub page_end: i32,
    pub score: f32,
}

/// Retriever over an embedder, a vector store, and the relational store
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    repository: Repository,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        repository: Repository,
    ) -> Self {
        Self {
            embedder,
            store,
            repository,
        }
    }

    /// Retrieve the top-k most similar chunks for a query, scoped to the
    /// given materials and the current embedding model. Results preserve the
    /// store's ranking; ids that fail to hydrate (e.g. a chunk deleted by a
    /// concurrent re-ingestion) are dropped.
    pub async fn retrieve(
        &self,
        material_ids: &[Uuid],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let _timer = Timer::start("retrieval_duration_seconds");

        let query_vector = self.embedder.embed(query).await?;

        let ranked = self
            .store
            .search(&VectorSearchRequest {
                material_ids: material_ids.to_vec(),
                model: self.embedder.model_name().to_string(),
                query_vector,
                top_k,
            })
            .await?;

        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = ranked.iter().map(|r| r.chunk_id).collect();
        let hydrated = self.repository.get_chunks_by_ids(&ids).await?;

        let results = order_by_rank(&ranked, hydrated);

        debug!(
            requested = top_k,
            ranked = ranked.len(),
            hydrated = results.len(),
            "Retrieval complete"
        );

        Ok(results)
    }
}

/// Re-sort hydrated records into the ranked id order. Hydration may return
/// records in arbitrary order and may be missing ids; missing ids are
/// dropped, the ranking is never reordered.
pub fn order_by_rank(
    ranked: &[ScoredChunk],
    hydrated: Vec<HydratedChunk>,
) -> Vec<RetrievedChunk> {
    let mut by_id: HashMap<Uuid, HydratedChunk> =
        hydrated.into_iter().map(|c| (c.chunk_id, c)).collect();

    ranked
        .iter()
        .filter_map(|scored| {
            let record = by_id.remove(&scored.chunk_id)?;
            Some(RetrievedChunk {
                chunk_id: record.chunk_id,
                material_id: record.material_id,
                material_title: record.material_title,
                content: record.content,
                chunk_index: record.chunk_index,
                page_start: record.page_start,
                page_end: record.page_end,
                score: scored.score,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydrated(chunk_id: Uuid, title: &str) -> HydratedChunk {
        HydratedChunk {
            chunk_id,
            material_id: Uuid::new_v4(),
            material_title: title.to_string(),
            content: format!("content of {title}"),
            chunk_index: 0,
            page_start: 1,
            page_end: 1,
        }
    }

    #[test]
    fn test_hydration_order_is_overridden_by_rank() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        let ranked = vec![
            ScoredChunk { chunk_id: first, score: 0.9 },
            ScoredChunk { chunk_id: second, score: 0.8 },
            ScoredChunk { chunk_id: third, score: 0.7 },
        ];
        // Hydration returns records shuffled
        let records = vec![
            hydrated(third, "c"),
            hydrated(first, "a"),
            hydrated(second, "b"),
        ];

        let ordered = order_by_rank(&ranked, records);

        assert_eq!(
            ordered.iter().map(|c| c.chunk_id).collect::<Vec<_>>(),
            vec![first, second, third]
        );
        assert_eq!(ordered[0].score, 0.9);
    }

    #[test]
    fn test_missing_ids_are_dropped_not_reordered() {
        let first = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let last = Uuid::new_v4();

        let ranked = vec![
            ScoredChunk { chunk_id: first, score: 0.9 },
            ScoredChunk { chunk_id: gone, score: 0.8 },
            ScoredChunk { chunk_id: last, score: 0.7 },
        ];
        let records = vec![hydrated(last, "z"), hydrated(first, "a")];

        let ordered = order_by_rank(&ranked, records);

        assert_eq!(
            ordered.iter().map(|c| c.chunk_id).collect::<Vec<_>>(),
            vec![first, last]
        );
    }
}
