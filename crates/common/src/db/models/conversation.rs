//! Conversation entity
//!
//! A thread grouping messages of one type (chat, summary, exam) for one
//! user. Created lazily on first interaction or reused via an explicit id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Conversation kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Chat,
    Summary,
    Exam,
}

impl From<String> for ConversationKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "summary" => ConversationKind::Summary,
            "exam" => ConversationKind::Exam,
            _ => ConversationKind::Chat,
        }
    }
}

impl From<ConversationKind> for String {
    fn from(kind: ConversationKind) -> Self {
        match kind {
            ConversationKind::Chat => "chat".to_string(),
            ConversationKind::Summary => "summary".to_string(),
            ConversationKind::Exam => "exam".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Associated material ids as a JSONB array
    #[sea_orm(column_type = "JsonBinary")]
    pub material_ids: Json,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the conversation kind as an enum
    pub fn conversation_kind(&self) -> ConversationKind {
        ConversationKind::from(self.kind.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
