//! Ingestion pipeline
//!
//! Orchestrates fetch -> parse -> chunk -> embed -> store for one material,
//! with the index status state machine persisted on the material record:
//! PENDING -> INDEXING -> {INDEXED | FAILED}. Re-ingestion re-enters INDEXING
//! from any state and fully replaces the prior chunk set.

use crate::chunker::{collect_page_chunks, ChunkingConfig};
use crate::errors::IngestionError;
use crate::fetcher::Fetcher;
use crate::pdf::extract_pages;
use std::sync::Arc;
use studyforge_common::db::models::{IndexStatus, Material};
use studyforge_common::db::Repository;
use studyforge_common::embeddings::Embedder;
use studyforge_common::metrics;
use studyforge_search::{EmbeddingUpsert, VectorStore};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Only PDF materials are ingestable
const SUPPORTED_MIME: &str = "application/pdf";

/// Outcome of a successful ingestion
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub material_id: Uuid,
    pub pages: usize,
    pub chunks: usize,
}

/// Ingestion service with constructor-injected collaborators
pub struct IngestionService {
    repository: Repository,
    fetcher: Arc<dyn Fetcher>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl IngestionService {
    pub fn new(
        repository: Repository,
        fetcher: Arc<dyn Fetcher>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            repository,
            fetcher,
            embedder,
            store,
            chunking,
        }
    }

    /// Ingest one material.
    ///
    /// The INDEXING status is written before any fallible step so a crash
    /// mid-ingest is observable. On failure the material is marked FAILED
    /// with the error text and the error is rethrown; the caller invokes
    /// this fire-and-forget and logs rather than propagating to end users.
    ///
    /// Concurrent re-ingestion of the same material is not guarded here; the
    /// approval workflow triggers ingestion at most once per approval event.
    /// Callers needing that guarantee must serialize externally.
    #[instrument(skip(self), fields(material_id = %material_id))]
    pub async fn ingest_material(&self, material_id: Uuid) -> Result<IngestReport, IngestionError> {
        metrics::increment("ingest_total");

        self.repository
            .set_index_status(material_id, IndexStatus::Indexing, None)
            .await?;

        match self.run_pipeline(material_id).await {
            Ok(report) => {
                self.repository
                    .set_index_status(material_id, IndexStatus::Indexed, None)
                    .await?;

                info!(
                    pages = report.pages,
                    chunks = report.chunks,
                    "Material indexed"
                );
                Ok(report)
            }
            Err(e) => {
                metrics::increment("ingest_failures_total");
                warn!(error = %e, "Ingestion failed, marking material");

                if let Err(status_err) = self
                    .repository
                    .set_index_status(material_id, IndexStatus::Failed, Some(e.to_string()))
                    .await
                {
                    warn!(error = %status_err, "Failed to record ingestion failure");
                }

                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, material_id: Uuid) -> Result<IngestReport, IngestionError> {
        let material = self
            .repository
            .find_material_by_id(material_id)
            .await?
            .ok_or_else(|| IngestionError::MaterialNotFound(material_id.to_string()))?;

        let storage_url = validate_material(&material)?;

        let bytes = self.fetcher.fetch(&storage_url).await?;
        let pages = extract_pages(&bytes)?;

        let new_chunks = collect_page_chunks(&pages, &self.chunking);
        if new_chunks.is_empty() {
            return Err(IngestionError::NoExtractableText);
        }

        info!(
            pages = pages.len(),
            chunks = new_chunks.len(),
            "Material parsed and chunked"
        );

        let chunk_count = new_chunks.len();
        let chunks = self
            .repository
            .replace_material_chunks(material_id, new_chunks)
            .await?;

        // Embed one chunk at a time: bounds memory and respects rate limits
        // on the embedding backend.
        for chunk in &chunks {
            let vector = self.embedder.embed(&chunk.content).await?;

            self.store
                .upsert(EmbeddingUpsert {
                    chunk_id: chunk.id,
                    material_id,
                    model: self.embedder.model_name().to_string(),
                    dims: self.embedder.dimension(),
                    vector,
                })
                .await?;
        }

        Ok(IngestReport {
            material_id,
            pages: pages.len(),
            chunks: chunk_count,
        })
    }
}

/// Fail fast on materials that cannot be ingested: they must exist, be
/// approved, carry a storage URL, and be a PDF.
fn validate_material(material: &Material) -> Result<String, IngestionError> {
    if !material.is_approved() {
        return Err(IngestionError::NotApproved(material.id.to_string()));
    }

    if material.mime_type != SUPPORTED_MIME {
        return Err(IngestionError::UnsupportedMime(material.mime_type.clone()));
    }

    material
        .storage_url
        .clone()
        .ok_or_else(|| IngestionError::MissingStorageUrl(material.id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(approval: &str, mime: &str, url: Option<&str>) -> Material {
        let now = chrono::Utc::now();
        Material {
            id: Uuid::new_v4(),
            owner_user_id: Uuid::new_v4(),
            title: "Lecture Notes".to_string(),
            mime_type: mime.to_string(),
            storage_url: url.map(String::from),
            approval_status: approval.to_string(),
            visibility: "private".to_string(),
            index_status: "pending".to_string(),
            index_error: None,
            indexed_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_validate_rejects_unapproved() {
        let m = material("submitted", SUPPORTED_MIME, Some("https://s.test/a.pdf"));
        let err = validate_material(&m).unwrap_err();
        assert!(matches!(err, IngestionError::NotApproved(_)));
    }

    #[test]
    fn test_validate_rejects_non_pdf() {
        let m = material("approved", "image/png", Some("https://s.test/a.png"));
        let err = validate_material(&m).unwrap_err();
        assert!(matches!(err, IngestionError::UnsupportedMime(_)));
    }

    #[test]
    fn test_validate_rejects_missing_url() {
        let m = material("approved", SUPPORTED_MIME, None);
        let err = validate_material(&m).unwrap_err();
        assert!(matches!(err, IngestionError::MissingStorageUrl(_)));
    }

    #[test]
    fn test_validate_accepts_approved_pdf() {
        let m = material("approved", SUPPORTED_MIME, Some("https://s.test/a.pdf"));
        assert_eq!(validate_material(&m).unwrap(), "https://s.test/a.pdf");
    }
}
