//! Chunk entity
//!
//! A contiguous slice of a material's extracted text. Chunking runs per page,
//! so a chunk never spans pages: page_start == page_end.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub material_id: Uuid,

    /// Sequence index, monotonic across the whole material
    pub chunk_index: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub page_start: i32,

    pub page_end: i32,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id",
        on_delete = "Cascade"
    )]
    Material,

    #[sea_orm(has_many = "super::embedding::Entity")]
    Embeddings,
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl Related<super::embedding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Embeddings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
