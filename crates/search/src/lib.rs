//! StudyForge Search
//!
//! Vector similarity search scoped to a set of materials and one embedding
//! model, plus the retrieval layer that embeds a query, searches the store,
//! and hydrates ranked chunk ids into full records.

pub mod retrieval;
pub mod store;

pub use retrieval::{order_by_rank, RetrievedChunk, Retriever};
pub use store::{
    cosine_similarity, EmbeddingUpsert, InMemoryVectorStore, ScoredChunk, SqlVectorStore,
    VectorSearchRequest, VectorStore,
};
