//! Orchestration service
//!
//! The top-level facade invoked by route handlers after authentication has
//! resolved the user id. Every operation access-checks the requested
//! materials before any retrieval or LLM call; insufficient-material
//! outcomes are sentinel responses, not errors.

use crate::exam::{self, ExamJson};
use crate::prompts;
use futures::channel::mpsc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studyforge_common::db::models::{ConversationKind, MessageRole};
use studyforge_common::db::Repository;
use studyforge_common::errors::{AppError, Result};
use studyforge_common::llm::{ChatMessage, ChatOptions, ChatProvider, TokenStream};
use studyforge_common::metrics::{self, Timer};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const ANSWER_TOP_K: usize = 6;
const SUMMARY_TOP_K: usize = 10;
const EXAM_TOP_K: usize = 12;

fn default_answer_top_k() -> usize {
    ANSWER_TOP_K
}

fn default_style() -> String {
    "bullet".to_string()
}

fn default_count() -> usize {
    5
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_exam_type() -> String {
    "multiple-choice".to_string()
}

/// Ask a grounded question
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    #[validate(length(min = 1))]
    pub material_ids: Vec<Uuid>,

    #[serde(default = "default_answer_top_k")]
    pub top_k: usize,

    pub conversation_id: Option<Uuid>,
}

/// One citation in a response: source number as numbered in the prompt,
/// mapped to the cited chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceItem {
    pub source_number: i32,
    pub chunk_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub answer: String,
    pub log_id: Uuid,
    pub used_material_ids: Vec<Uuid>,
    pub retrieved_chunk_ids: Vec<Uuid>,
    pub conversation_id: Uuid,
    pub references: Vec<ReferenceItem>,
}

/// A streaming answer: the token stream plus the query log the accumulated
/// text is filled into once the stream ends
pub struct StreamAnswer {
    pub log_id: Uuid,
    pub stream: TokenStream,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    #[validate(length(min = 1))]
    pub material_ids: Vec<Uuid>,

    #[serde(default = "default_style")]
    pub style: String,

    pub conversation_id: Option<Uuid>,

    #[serde(default)]
    pub save_conversation: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeResponse {
    pub summary: String,
    pub used_material_ids: Vec<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub references: Vec<ReferenceItem>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequest {
    #[validate(length(min = 1))]
    pub material_ids: Vec<Uuid>,

    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 50))]
    pub count: usize,

    #[serde(default = "default_difficulty")]
    pub difficulty: String,

    #[serde(default = "default_exam_type")]
    pub exam_type: String,

    pub conversation_id: Option<Uuid>,

    #[serde(default)]
    pub save_conversation: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResponse {
    pub exam: String,
    pub exam_json: Option<ExamJson>,
    pub used_material_ids: Vec<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub references: Vec<ReferenceItem>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdviseRequest {
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
}

/// The orchestration service with constructor-injected collaborators
pub struct AssistantService {
    repository: Repository,
    retriever: Arc<studyforge_search::Retriever>,
    llm: Arc<dyn ChatProvider>,
}

impl AssistantService {
    pub fn new(
        repository: Repository,
        retriever: Arc<studyforge_search::Retriever>,
        llm: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            repository,
            retriever,
            llm,
        }
    }

    /// Answer a question grounded in the given materials.
    ///
    /// Source numbers are assigned 1..N in retrieval-rank order; the same
    /// numbering flows through the prompt, the stored references, and the
    /// returned payload.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn answer_question(
        &self,
        user_id: Uuid,
        request: AnswerRequest,
    ) -> Result<AnswerResponse> {
        let _timer = Timer::start("generation_duration_seconds");
        validate(&request)?;
        non_blank(&request.question, "question")?;
        metrics::increment("questions_total");

        // Access check happens before any persistence or retrieval: a
        // rejected request leaves no query log row behind.
        self.repository
            .assert_materials_accessible(user_id, &request.material_ids)
            .await?;

        let log = self
            .repository
            .create_query_log(
                user_id,
                request.material_ids.first().copied(),
                &request.question,
            )
            .await?;

        let conversation_id = self
            .resolve_conversation(
                user_id,
                request.conversation_id,
                ConversationKind::Chat,
                &prompts::conversation_title(&request.question),
                &request.material_ids,
            )
            .await?;

        self.repository
            .append_message(conversation_id, MessageRole::User, &request.question, &[])
            .await?;

        let chunks = self
            .retriever
            .retrieve(&request.material_ids, &request.question, request.top_k)
            .await?;

        if chunks.is_empty() {
            self.repository
                .set_query_log_answer(log.id, prompts::NO_MATERIAL_ANSWER)
                .await?;
            self.repository
                .append_message(
                    conversation_id,
                    MessageRole::Assistant,
                    prompts::NO_MATERIAL_ANSWER,
                    &[],
                )
                .await?;

            return Ok(AnswerResponse {
                answer: prompts::NO_MATERIAL_ANSWER.to_string(),
                log_id: log.id,
                used_material_ids: request.material_ids,
                retrieved_chunk_ids: Vec::new(),
                conversation_id,
                references: Vec::new(),
            });
        }

        let scored: Vec<(Uuid, f64)> =
            chunks.iter().map(|c| (c.chunk_id, c.score as f64)).collect();
        self.repository
            .create_retrieval_records(log.id, &scored)
            .await?;

        let sources = prompts::build_sources_block(&chunks);
        let answer = self
            .llm
            .chat(
                &[
                    ChatMessage::system(prompts::ANSWER_SYSTEM_PROMPT),
                    ChatMessage::user(format!(
                        "Sources:\n{}\nQuestion: {}",
                        sources, request.question
                    )),
                ],
                &ChatOptions::default(),
            )
            .await?;
        metrics::increment("llm_calls_total");

        let references = references_for(&chunks);
        let reference_pairs: Vec<(i32, Uuid)> = references
            .iter()
            .map(|r| (r.source_number, r.chunk_id))
            .collect();

        self.repository.set_query_log_answer(log.id, &answer).await?;
        self.repository
            .append_message(
                conversation_id,
                MessageRole::Assistant,
                &answer,
                &reference_pairs,
            )
            .await?;

        info!(log_id = %log.id, chunks = chunks.len(), "Question answered");

        Ok(AnswerResponse {
            answer,
            log_id: log.id,
            used_material_ids: request.material_ids,
            retrieved_chunk_ids: chunks.iter().map(|c| c.chunk_id).collect(),
            conversation_id,
            references,
        })
    }

    /// Answer a question as a token stream.
    ///
    /// Same preconditions, access check, and retrieval as
    /// [`answer_question`](Self::answer_question), but no conversation or
    /// message trail is persisted: only the query log, filled with the fully
    /// accumulated text after the stream ends. When retrieval yields nothing
    /// the sentinel is yielded once and the stream closes.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn stream_answer_question(
        &self,
        user_id: Uuid,
        request: AnswerRequest,
    ) -> Result<StreamAnswer> {
        validate(&request)?;
        non_blank(&request.question, "question")?;
        metrics::increment("questions_total");

        self.repository
            .assert_materials_accessible(user_id, &request.material_ids)
            .await?;

        let log = self
            .repository
            .create_query_log(
                user_id,
                request.material_ids.first().copied(),
                &request.question,
            )
            .await?;

        let chunks = self
            .retriever
            .retrieve(&request.material_ids, &request.question, request.top_k)
            .await?;

        let (tx, rx) = mpsc::unbounded::<Result<String>>();

        if chunks.is_empty() {
            self.repository
                .set_query_log_answer(log.id, prompts::NO_MATERIAL_ANSWER)
                .await?;
            let _ = tx.unbounded_send(Ok(prompts::NO_MATERIAL_ANSWER.to_string()));
            drop(tx);

            return Ok(StreamAnswer {
                log_id: log.id,
                stream: Box::pin(rx),
            });
        }

        let scored: Vec<(Uuid, f64)> =
            chunks.iter().map(|c| (c.chunk_id, c.score as f64)).collect();
        self.repository
            .create_retrieval_records(log.id, &scored)
            .await?;

        let sources = prompts::build_sources_block(&chunks);
        let mut upstream = self
            .llm
            .chat_stream(
                &[
                    ChatMessage::system(prompts::ANSWER_SYSTEM_PROMPT),
                    ChatMessage::user(format!(
                        "Sources:\n{}\nQuestion: {}",
                        sources, request.question
                    )),
                ],
                &ChatOptions::default(),
            )
            .await?;
        metrics::increment("llm_calls_total");

        let repository = self.repository.clone();
        let log_id = log.id;

        // Forward tokens to the caller while accumulating the full text; the
        // query log is filled when the upstream ends, even if the client has
        // gone away mid-stream.
        tokio::spawn(async move {
            let mut accumulated = String::new();
            let mut client_gone = false;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(token) => {
                        accumulated.push_str(&token);
                        if !client_gone && tx.unbounded_send(Ok(token)).is_err() {
                            client_gone = true;
                        }
                    }
                    Err(e) => {
                        let _ = tx.unbounded_send(Err(e));
                        break;
                    }
                }
            }

            if !accumulated.is_empty() {
                if let Err(e) = repository.set_query_log_answer(log_id, &accumulated).await {
                    warn!(error = %e, log_id = %log_id, "Failed to fill streamed answer");
                }
            }
        });

        Ok(StreamAnswer {
            log_id,
            stream: Box::pin(rx),
        })
    }

    /// Summarize the given materials in the requested style
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn summarize(
        &self,
        user_id: Uuid,
        request: SummarizeRequest,
    ) -> Result<SummarizeResponse> {
        let _timer = Timer::start("generation_duration_seconds");
        validate(&request)?;
        metrics::increment("summaries_total");

        let materials = self
            .repository
            .assert_materials_accessible(user_id, &request.material_ids)
            .await?;

        let chunks = self
            .retriever
            .retrieve(
                &request.material_ids,
                &prompts::summary_query(&request.style),
                SUMMARY_TOP_K,
            )
            .await?;

        if chunks.is_empty() {
            return Ok(SummarizeResponse {
                summary: prompts::NO_MATERIAL_SUMMARY.to_string(),
                used_material_ids: request.material_ids,
                conversation_id: None,
                references: Vec::new(),
            });
        }

        let sources = prompts::build_sources_block(&chunks);
        let summary = self
            .llm
            .chat(
                &[
                    ChatMessage::system(prompts::summary_instruction(&request.style)),
                    ChatMessage::user(format!("Sources:\n{}", sources)),
                ],
                &ChatOptions::default(),
            )
            .await?;
        metrics::increment("llm_calls_total");

        let references = references_for(&chunks);

        let conversation_id = if request.save_conversation {
            let title = materials
                .first()
                .map(|m| m.title.clone())
                .unwrap_or_else(|| "Summary".to_string());
            let conversation_id = self
                .resolve_conversation(
                    user_id,
                    request.conversation_id,
                    ConversationKind::Summary,
                    &title,
                    &request.material_ids,
                )
                .await?;

            let reference_pairs: Vec<(i32, Uuid)> = references
                .iter()
                .map(|r| (r.source_number, r.chunk_id))
                .collect();
            self.repository
                .append_message(
                    conversation_id,
                    MessageRole::Assistant,
                    &summary,
                    &reference_pairs,
                )
                .await?;

            Some(conversation_id)
        } else {
            None
        };

        Ok(SummarizeResponse {
            summary,
            used_material_ids: request.material_ids,
            conversation_id,
            references,
        })
    }

    /// Generate an exam from the given materials.
    ///
    /// Output truncation propagates unmodified so the HTTP boundary reports
    /// the distinct truncation code; any other generation or validation
    /// failure becomes the user-facing retry message instead of a 500.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn generate_exam(
        &self,
        user_id: Uuid,
        request: ExamRequest,
    ) -> Result<ExamResponse> {
        let _timer = Timer::start("generation_duration_seconds");
        validate(&request)?;
        metrics::increment("exams_total");

        let materials = self
            .repository
            .assert_materials_accessible(user_id, &request.material_ids)
            .await?;

        let chunks = self
            .retriever
            .retrieve(
                &request.material_ids,
                &prompts::exam_query(&request.difficulty, &request.exam_type),
                EXAM_TOP_K,
            )
            .await?;

        if chunks.is_empty() {
            return Ok(ExamResponse {
                exam: prompts::NO_MATERIAL_EXAM.to_string(),
                exam_json: None,
                used_material_ids: request.material_ids,
                conversation_id: None,
                references: Vec::new(),
            });
        }

        let sources = prompts::build_sources_block(&chunks);

        let questions = match exam::generate_exam_questions(
            self.llm.as_ref(),
            &sources,
            request.count,
            &request.difficulty,
            &request.exam_type,
        )
        .await
        {
            Ok(questions) => questions,
            Err(e @ AppError::LlmTruncated { .. }) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Exam generation failed, returning retry message");
                return Ok(ExamResponse {
                    exam: prompts::EXAM_FAILED_MESSAGE.to_string(),
                    exam_json: None,
                    used_material_ids: request.material_ids,
                    conversation_id: None,
                    references: Vec::new(),
                });
            }
        };
        metrics::increment("llm_calls_total");

        let exam_text = exam::render_exam_text(&questions);
        let references = references_for(&chunks);

        let conversation_id = if request.save_conversation {
            let title = materials
                .first()
                .map(|m| format!("Exam: {}", m.title))
                .unwrap_or_else(|| "Exam".to_string());
            let conversation_id = self
                .resolve_conversation(
                    user_id,
                    request.conversation_id,
                    ConversationKind::Exam,
                    &title,
                    &request.material_ids,
                )
                .await?;

            let reference_pairs: Vec<(i32, Uuid)> = references
                .iter()
                .map(|r| (r.source_number, r.chunk_id))
                .collect();
            self.repository
                .append_message(
                    conversation_id,
                    MessageRole::Assistant,
                    &exam_text,
                    &reference_pairs,
                )
                .await?;

            Some(conversation_id)
        } else {
            None
        };

        info!(
            count = questions.len(),
            exam_type = %request.exam_type,
            "Exam generated"
        );

        Ok(ExamResponse {
            exam: exam_text,
            exam_json: Some(ExamJson { questions }),
            used_material_ids: request.material_ids,
            conversation_id,
            references,
        })
    }

    /// Stateless advisor passthrough: no retrieval, no persistence
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn advise(&self, user_id: Uuid, request: AdviseRequest) -> Result<String> {
        validate(&request)?;
        non_blank(&request.prompt, "prompt")?;

        let answer = self
            .llm
            .chat(
                &[
                    ChatMessage::system(prompts::ADVISOR_SYSTEM_PROMPT),
                    ChatMessage::user(request.prompt),
                ],
                &ChatOptions::default(),
            )
            .await?;
        metrics::increment("llm_calls_total");

        Ok(answer)
    }

    /// Resolve an explicitly reused conversation or lazily create one
    async fn resolve_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Option<Uuid>,
        kind: ConversationKind,
        title: &str,
        material_ids: &[Uuid],
    ) -> Result<Uuid> {
        match conversation_id {
            Some(id) => {
                let conversation = self
                    .repository
                    .find_conversation(id, user_id)
                    .await?
                    .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;
                Ok(conversation.id)
            }
            None => Ok(self
                .repository
                .create_conversation(user_id, kind, title, material_ids)
                .await?
                .id),
        }
    }
}

/// Source numbers 1..N in retrieval-rank order
fn references_for(chunks: &[studyforge_search::RetrievedChunk]) -> Vec<ReferenceItem> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| ReferenceItem {
            source_number: (i + 1) as i32,
            chunk_id: c.chunk_id,
        })
        .collect()
}

fn validate<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}

fn non_blank(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation {
            message: format!("{} must not be blank", field),
            field: Some(field.to_string()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyforge_search::RetrievedChunk;

    #[test]
    fn test_request_defaults() {
        let answer: AnswerRequest = serde_json::from_str(
            r#"{"question": "What is X?", "materialIds": ["8e5a1f34-27ea-44ac-925f-63b783a5f55a"]}"#,
        )
        .unwrap();
        assert_eq!(answer.top_k, 6);
        assert!(answer.conversation_id.is_none());

        let exam: ExamRequest = serde_json::from_str(
            r#"{"materialIds": ["8e5a1f34-27ea-44ac-925f-63b783a5f55a"]}"#,
        )
        .unwrap();
        assert_eq!(exam.count, 5);
        assert_eq!(exam.difficulty, "medium");
        assert_eq!(exam.exam_type, "multiple-choice");
        assert!(!exam.save_conversation);
    }

    #[test]
    fn test_empty_material_ids_fail_validation() {
        let request: AnswerRequest =
            serde_json::from_str(r#"{"question": "Q?", "materialIds": []}"#).unwrap();
        assert!(validate(&request).is_err());
    }

    #[test]
    fn test_blank_question_rejected() {
        assert!(non_blank("  \n ", "question").is_err());
        assert!(non_blank("What is X?", "question").is_ok());
    }

    #[test]
    fn test_reference_numbering_matches_rank_order() {
        let chunks: Vec<RetrievedChunk> = (0..3)
            .map(|i| RetrievedChunk {
                chunk_id: Uuid::new_v4(),
                material_id: Uuid::new_v4(),
                material_title: "T".to_string(),
                content: "c".to_string(),
                chunk_index: i,
                page_start: 1,
                page_end: 1,
                score: 1.0 - i as f32 * 0.1,
            })
            .collect();

        let references = references_for(&chunks);

        assert_eq!(
            references.iter().map(|r| r.source_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        for (reference, chunk) in references.iter().zip(chunks.iter()) {
            assert_eq!(reference.chunk_id, chunk.chunk_id);
        }
    }
}
