//! Material entity
//!
//! An uploaded course document. Only approved materials may be indexed or
//! retrieved; the index status column is owned exclusively by the ingestion
//! pipeline.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Approval workflow status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Uploaded,
    Submitted,
    Approved,
    Rejected,
}

impl From<String> for ApprovalStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "uploaded" => ApprovalStatus::Uploaded,
            "submitted" => ApprovalStatus::Submitted,
            "approved" => ApprovalStatus::Approved,
            "rejected" => ApprovalStatus::Rejected,
            _ => ApprovalStatus::Uploaded,
        }
    }
}

impl From<ApprovalStatus> for String {
    fn from(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::Uploaded => "uploaded".to_string(),
            ApprovalStatus::Submitted => "submitted".to_string(),
            ApprovalStatus::Approved => "approved".to_string(),
            ApprovalStatus::Rejected => "rejected".to_string(),
        }
    }
}

/// Indexing state machine status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Pending,
    Indexing,
    Indexed,
    Failed,
}

impl From<String> for IndexStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => IndexStatus::Pending,
            "indexing" => IndexStatus::Indexing,
            "indexed" => IndexStatus::Indexed,
            "failed" => IndexStatus::Failed,
            _ => IndexStatus::Pending,
        }
    }
}

impl From<IndexStatus> for String {
    fn from(status: IndexStatus) -> Self {
        match status {
            IndexStatus::Pending => "pending".to_string(),
            IndexStatus::Indexing => "indexing".to_string(),
            IndexStatus::Indexed => "indexed".to_string(),
            IndexStatus::Failed => "failed".to_string(),
        }
    }
}

/// Material visibility
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
}

impl From<String> for Visibility {
    fn from(s: String) -> Self {
        match s.as_str() {
            "public" => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

impl From<Visibility> for String {
    fn from(v: Visibility) -> Self {
        match v {
            Visibility::Private => "private".to_string(),
            Visibility::Public => "public".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub mime_type: String,

    /// URL of the stored file in object storage
    #[sea_orm(column_type = "Text", nullable)]
    pub storage_url: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub approval_status: String,

    #[sea_orm(column_type = "Text")]
    pub visibility: String,

    #[sea_orm(column_type = "Text")]
    pub index_status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub index_error: Option<String>,

    pub indexed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the approval status as an enum
    pub fn approval(&self) -> ApprovalStatus {
        ApprovalStatus::from(self.approval_status.clone())
    }

    /// Get the index status as an enum
    pub fn index_state(&self) -> IndexStatus {
        IndexStatus::from(self.index_status.clone())
    }

    /// Check whether this material is approved for indexing and retrieval
    pub fn is_approved(&self) -> bool {
        self.approval() == ApprovalStatus::Approved
    }

    /// Check whether this material is visible to everyone
    pub fn is_public(&self) -> bool {
        Visibility::from(self.visibility.clone()) == Visibility::Public
    }

    /// A material is accessible to a user iff it is approved AND
    /// (owned by the user OR public).
    pub fn is_accessible_to(&self, user_id: Uuid) -> bool {
        self.is_approved() && (self.owner_user_id == user_id || self.is_public())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(owner: Uuid, approval: &str, visibility: &str) -> Model {
        let now = chrono::Utc::now();
        Model {
            id: Uuid::new_v4(),
            owner_user_id: owner,
            title: "Calculus Notes".to_string(),
            mime_type: "application/pdf".to_string(),
            storage_url: Some("https://storage.test/calc.pdf".to_string()),
            approval_status: approval.to_string(),
            visibility: visibility.to_string(),
            index_status: "pending".to_string(),
            index_error: None,
            indexed_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_owner_access_requires_approval() {
        let owner = Uuid::new_v4();
        assert!(material(owner, "approved", "private").is_accessible_to(owner));
        assert!(!material(owner, "submitted", "private").is_accessible_to(owner));
    }

    #[test]
    fn test_public_access_for_non_owner() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        assert!(material(owner, "approved", "public").is_accessible_to(stranger));
        assert!(!material(owner, "approved", "private").is_accessible_to(stranger));
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(IndexStatus::from(String::from(IndexStatus::Indexing)), IndexStatus::Indexing);
        assert_eq!(ApprovalStatus::from("rejected".to_string()), ApprovalStatus::Rejected);
    }
}
