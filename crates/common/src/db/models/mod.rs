//! SeaORM entity models
//!
//! Database entities for the StudyForge core

mod chunk;
mod conversation;
mod embedding;
mod material;
mod message;
mod message_reference;
mod query_log;
mod retrieval_record;

pub use material::{
    Entity as MaterialEntity,
    Model as Material,
    ActiveModel as MaterialActiveModel,
    Column as MaterialColumn,
    ApprovalStatus, IndexStatus, Visibility,
};

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
};

pub use embedding::{
    Entity as EmbeddingEntity,
    Model as Embedding,
    ActiveModel as EmbeddingActiveModel,
    Column as EmbeddingColumn,
    format_vector, parse_vector_text,
};

pub use query_log::{
    Entity as QueryLogEntity,
    Model as QueryLog,
    ActiveModel as QueryLogActiveModel,
    Column as QueryLogColumn,
};

pub use retrieval_record::{
    Entity as RetrievalRecordEntity,
    Model as RetrievalRecord,
    ActiveModel as RetrievalRecordActiveModel,
    Column as RetrievalRecordColumn,
};

pub use conversation::{
    Entity as ConversationEntity,
    Model as Conversation,
    ActiveModel as ConversationActiveModel,
    Column as ConversationColumn,
    ConversationKind,
};

pub use message::{
    Entity as MessageEntity,
    Model as Message,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
    MessageRole,
};

pub use message_reference::{
    Entity as MessageReferenceEntity,
    Model as MessageReference,
    ActiveModel as MessageReferenceActiveModel,
    Column as MessageReferenceColumn,
};
