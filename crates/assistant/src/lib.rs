//! StudyForge Assistant
//!
//! The orchestration layer over retrieval and the LLM provider: grounded
//! question answering (sync and streaming), summarization, exam generation
//! with schema-validated batched output, and the study advisor passthrough.

pub mod exam;
pub mod prompts;
pub mod service;

pub use exam::{ExamJson, ExamQuestion, QuestionKind};
pub use service::{
    AnswerRequest, AnswerResponse, AssistantService, AdviseRequest, ExamRequest, ExamResponse,
    ReferenceItem, StreamAnswer, SummarizeRequest, SummarizeResponse,
};
