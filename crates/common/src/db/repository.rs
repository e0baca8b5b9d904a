//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A chunk hydrated with its parent material's metadata, as returned to the
/// retrieval layer. Hydration order is arbitrary; ranking is restored by the
/// caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydratedChunk {
    pub chunk_id: Uuid,
    pub material_id: Uuid,
    pub material_title: String,
    pub content: String,
    pub chunk_index: i32,
    pub page_start: i32,
    pub page_end: i32,
}

/// A chunk to be persisted during ingestion
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub content: String,
    pub page_start: i32,
    pub page_end: i32,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Material Operations
    // ========================================================================

    /// Find material by ID
    pub async fn find_material_by_id(&self, id: Uuid) -> Result<Option<Material>> {
        MaterialEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find materials by IDs
    pub async fn find_materials_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Material>> {
        MaterialEntity::find()
            .filter(MaterialColumn::Id.is_in(ids.iter().copied()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Assert every material id is accessible to the user: approved AND
    /// (owned by the user OR public). Returns the materials in the order the
    /// ids were given.
    pub async fn assert_materials_accessible(
        &self,
        user_id: Uuid,
        material_ids: &[Uuid],
    ) -> Result<Vec<Material>> {
        let found = self.find_materials_by_ids(material_ids).await?;
        let by_id: HashMap<Uuid, Material> =
            found.into_iter().map(|m| (m.id, m)).collect();

        let mut materials = Vec::with_capacity(material_ids.len());
        for id in material_ids {
            let material = by_id.get(id).ok_or_else(|| AppError::MaterialNotFound {
                id: id.to_string(),
            })?;
            if !material.is_accessible_to(user_id) {
                return Err(AppError::MaterialNotAccessible { id: id.to_string() });
            }
            materials.push(material.clone());
        }
        Ok(materials)
    }

    /// Transition a material's index status. Clears the error text unless one
    /// is supplied, and stamps indexed_at when entering Indexed.
    pub async fn set_index_status(
        &self,
        material_id: Uuid,
        status: IndexStatus,
        error: Option<String>,
    ) -> Result<Material> {
        let now = chrono::Utc::now();

        let mut material: MaterialActiveModel = MaterialEntity::find_by_id(material_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::MaterialNotFound {
                id: material_id.to_string(),
            })?
            .into();

        material.index_status = Set(String::from(status.clone()));
        material.index_error = Set(error);
        material.updated_at = Set(now.into());

        if status == IndexStatus::Indexed {
            material.indexed_at = Set(Some(now.into()));
        }

        material.update(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Replace a material's chunk set in one transaction: delete retrieval
    /// records and embeddings for the material's current chunks, delete the
    /// chunks, then insert the new set. Returns the inserted chunks in index
    /// order.
    pub async fn replace_material_chunks(
        &self,
        material_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>> {
        let txn = self.write_conn().begin().await?;

        for sql in [
            "DELETE FROM retrieval_records WHERE chunk_id IN (SELECT id FROM chunks WHERE material_id = $1)",
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE material_id = $1)",
            "DELETE FROM chunks WHERE material_id = $1",
        ] {
            txn.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![material_id.into()],
            ))
            .await?;
        }

        let now = chrono::Utc::now();
        let mut inserted = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let model = ChunkActiveModel {
                id: Set(Uuid::new_v4()),
                material_id: Set(material_id),
                chunk_index: Set(chunk.chunk_index),
                content: Set(chunk.content),
                page_start: Set(chunk.page_start),
                page_end: Set(chunk.page_end),
                created_at: Set(now.into()),
            };
            inserted.push(model.insert(&txn).await?);
        }

        txn.commit().await?;
        Ok(inserted)
    }

    /// Get chunks for a material, ordered by chunk index
    pub async fn get_chunks_by_material(&self, material_id: Uuid) -> Result<Vec<Chunk>> {
        ChunkEntity::find()
            .filter(ChunkColumn::MaterialId.eq(material_id))
            .order_by_asc(ChunkColumn::ChunkIndex)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Hydrate chunk ids into chunk + material records. Ids that no longer
    /// resolve are silently absent from the result; order is unspecified.
    pub async fn get_chunks_by_ids(&self, chunk_ids: &[Uuid]) -> Result<Vec<HydratedChunk>> {
        let chunks = ChunkEntity::find()
            .filter(ChunkColumn::Id.is_in(chunk_ids.iter().copied()))
            .all(self.read_conn())
            .await?;

        let material_ids: Vec<Uuid> = chunks.iter().map(|c| c.material_id).collect();
        let materials = self.find_materials_by_ids(&material_ids).await?;
        let titles: HashMap<Uuid, String> =
            materials.into_iter().map(|m| (m.id, m.title)).collect();

        Ok(chunks
            .into_iter()
            .filter_map(|c| {
                let title = titles.get(&c.material_id)?.clone();
                Some(HydratedChunk {
                    chunk_id: c.id,
                    material_id: c.material_id,
                    material_title: title,
                    content: c.content,
                    chunk_index: c.chunk_index,
                    page_start: c.page_start,
                    page_end: c.page_end,
                })
            })
            .collect())
    }

    // ========================================================================
    // Embedding Operations
    // ========================================================================

    /// Upsert an embedding: exactly one row per (chunk_id, model), the latest
    /// vector and dims win.
    pub async fn upsert_embedding(
        &self,
        chunk_id: Uuid,
        model: &str,
        dims: i32,
        vector: &[f32],
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO embeddings (id, chunk_id, model, dims, vector, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (chunk_id, model) DO UPDATE SET
                dims = EXCLUDED.dims,
                vector = EXCLUDED.vector
            "#,
            vec![
                Uuid::new_v4().into(),
                chunk_id.into(),
                model.into(),
                dims.into(),
                format_vector(vector).into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Load all embeddings for the given materials under one model. This is
    /// the candidate set for the brute-force similarity scan.
    pub async fn embeddings_for_materials(
        &self,
        material_ids: &[Uuid],
        model: &str,
    ) -> Result<Vec<Embedding>> {
        let chunk_ids: Vec<Uuid> = ChunkEntity::find()
            .filter(ChunkColumn::MaterialId.is_in(material_ids.iter().copied()))
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        EmbeddingEntity::find()
            .filter(EmbeddingColumn::Model.eq(model))
            .filter(EmbeddingColumn::ChunkId.is_in(chunk_ids))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Query Log Operations
    // ========================================================================

    /// Create a query log row with a null answer
    pub async fn create_query_log(
        &self,
        user_id: Uuid,
        material_id: Option<Uuid>,
        question: &str,
    ) -> Result<QueryLog> {
        let log = QueryLogActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            material_id: Set(material_id),
            question: Set(question.to_string()),
            answer: Set(None),
            created_at: Set(chrono::Utc::now().into()),
        };

        log.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Fill the answer on a query log after generation completes
    pub async fn set_query_log_answer(&self, log_id: Uuid, answer: &str) -> Result<()> {
        let mut log: QueryLogActiveModel = QueryLogEntity::find_by_id(log_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "query_log".to_string(),
                id: log_id.to_string(),
            })?
            .into();

        log.answer = Set(Some(answer.to_string()));
        log.update(self.write_conn()).await?;
        Ok(())
    }

    /// Persist retrieval records, one per retrieved chunk, rank following the
    /// given order (1-based).
    pub async fn create_retrieval_records(
        &self,
        query_log_id: Uuid,
        scored_chunks: &[(Uuid, f64)],
    ) -> Result<()> {
        let now = chrono::Utc::now();

        for (rank, (chunk_id, score)) in scored_chunks.iter().enumerate() {
            let record = RetrievalRecordActiveModel {
                id: Set(Uuid::new_v4()),
                query_log_id: Set(query_log_id),
                chunk_id: Set(*chunk_id),
                score: Set(*score),
                rank: Set((rank + 1) as i32),
                created_at: Set(now.into()),
            };
            record.insert(self.write_conn()).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Find a conversation by id, scoped to its owner
    pub async fn find_conversation(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>> {
        Ok(ConversationEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .filter(|c| c.user_id == user_id))
    }

    /// Create a conversation of the given kind
    pub async fn create_conversation(
        &self,
        user_id: Uuid,
        kind: ConversationKind,
        title: &str,
        material_ids: &[Uuid],
    ) -> Result<Conversation> {
        let now = chrono::Utc::now();

        let conversation = ConversationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            kind: Set(String::from(kind)),
            title: Set(title.to_string()),
            material_ids: Set(serde_json::json!(material_ids)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        conversation.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Bump a conversation's updated_at
    pub async fn touch_conversation(&self, id: Uuid) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE conversations SET updated_at = NOW() WHERE id = $1",
            vec![id.into()],
        );
        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Append a message to a conversation, with its references (source number,
    /// chunk id) in source order.
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        references: &[(i32, Uuid)],
    ) -> Result<Message> {
        let now = chrono::Utc::now();

        let message = MessageActiveModel {
            id: Set(Uuid::new_v4()),
            conversation_id: Set(conversation_id),
            role: Set(String::from(role)),
            content: Set(content.to_string()),
            created_at: Set(now.into()),
        };
        let message = message.insert(self.write_conn()).await?;

        for (source_number, chunk_id) in references {
            let reference = MessageReferenceActiveModel {
                id: Set(Uuid::new_v4()),
                message_id: Set(message.id),
                source_number: Set(*source_number),
                chunk_id: Set(*chunk_id),
                created_at: Set(now.into()),
            };
            reference.insert(self.write_conn()).await?;
        }

        self.touch_conversation(conversation_id).await?;

        Ok(message)
    }

    /// List messages of a conversation in creation order
    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .order_by_asc(MessageColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
