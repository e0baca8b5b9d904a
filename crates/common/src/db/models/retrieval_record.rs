//! Retrieval record entity
//!
//! Links a query log to the chunks it retrieved, with similarity score and
//! rank. Created once per query that yields results; immutable.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "retrieval_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub query_log_id: Uuid,

    pub chunk_id: Uuid,

    pub score: f64,

    /// 1-based rank in the search result ordering
    pub rank: i32,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::query_log::Entity",
        from = "Column::QueryLogId",
        to = "super::query_log::Column::Id",
        on_delete = "Cascade"
    )]
    QueryLog,

    #[sea_orm(
        belongs_to = "super::chunk::Entity",
        from = "Column::ChunkId",
        to = "super::chunk::Column::Id",
        on_delete = "Cascade"
    )]
    Chunk,
}

impl Related<super::query_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QueryLog.def()
    }
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunk.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
