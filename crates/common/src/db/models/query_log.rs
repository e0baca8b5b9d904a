//! Query log entity
//!
//! One row per question asked; append-only except for the answer-fill update
//! after generation completes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "query_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    /// Primary material the question was asked against, when there is one
    pub material_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub question: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub answer: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::retrieval_record::Entity")]
    RetrievalRecords,
}

impl Related<super::retrieval_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RetrievalRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
