//! StudyForge Ingestion
//!
//! Converts an approved material into searchable chunks and embeddings:
//! fetch -> parse -> chunk -> embed -> store, with an indexing state machine
//! persisted on the material record.

pub mod chunker;
pub mod errors;
pub mod fetcher;
pub mod pdf;
pub mod pipeline;

pub use chunker::{chunk_text, collect_page_chunks, ChunkingConfig, TextChunk};
pub use errors::IngestionError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use pdf::{extract_pages, PdfPage};
pub use pipeline::{IngestReport, IngestionService};
