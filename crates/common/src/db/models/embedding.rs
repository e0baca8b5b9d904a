//! Embedding entity
//!
//! One vector per chunk per embedding model, stored as text for SeaORM
//! compatibility and parsed in Rust for similarity scoring. Exactly one row
//! per (chunk_id, model) pair; upserts replace the vector and dims.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub chunk_id: Uuid,

    /// Embedding model identifier; search filters on this
    #[sea_orm(column_type = "Text")]
    pub model: String,

    pub dims: i32,

    /// Vector stored as "[f32,f32,...]"
    #[sea_orm(column_type = "Text")]
    pub vector: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chunk::Entity",
        from = "Column::ChunkId",
        to = "super::chunk::Column::Id",
        on_delete = "Cascade"
    )]
    Chunk,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunk.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Render a vector in the stored text format
pub fn format_vector(vector: &[f32]) -> String {
    format!(
        "[{}]",
        vector.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

impl Model {
    /// Parse the stored text format back to Vec<f32>
    pub fn parse_vector(&self) -> Option<Vec<f32>> {
        parse_vector_text(&self.vector)
    }
}

/// Parse a "[1.0,2.0,...]" vector string
pub fn parse_vector_text(s: &str) -> Option<Vec<f32>> {
    let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_round_trip() {
        let v = vec![0.25, -1.5, 3.0];
        let text = format_vector(&v);
        assert_eq!(text, "[0.25,-1.5,3]");
        assert_eq!(parse_vector_text(&text).unwrap(), v);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_vector_text("[1.0,abc]").is_none());
    }
}
