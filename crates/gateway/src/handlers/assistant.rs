//! Assistant handlers: ask, streaming ask, summaries, exams, and advice

use crate::user::UserContext;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event as SseEvent, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use studyforge_assistant::{
    AdviseRequest, AnswerRequest, AnswerResponse, ExamRequest, ExamResponse, SummarizeRequest,
    SummarizeResponse,
};
use studyforge_common::errors::Result;

/// Answer a question grounded in approved materials
pub async fn ask(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>> {
    let response = state.assistant.answer_question(user.user_id, request).await?;
    Ok(Json(response))
}

/// Answer a question as a server-sent-events token stream.
///
/// Framing: each token arrives as `data: {"token": "..."}`; a terminal
/// `event: end` closes a successful stream, `event: error` carries a message
/// payload on failure.
pub async fn ask_stream(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<AnswerRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>> {
    use futures::StreamExt;

    let answer = state
        .assistant
        .stream_answer_question(user.user_id, request)
        .await?;

    let sse_stream = futures::stream::unfold(
        (answer.stream, false),
        |(mut tokens, finished)| async move {
            if finished {
                return None;
            }

            match tokens.next().await {
                Some(Ok(token)) => {
                    let payload = serde_json::json!({ "token": token }).to_string();
                    Some((Ok(SseEvent::default().data(payload)), (tokens, false)))
                }
                Some(Err(e)) => {
                    let payload = serde_json::json!({ "message": e.to_string() }).to_string();
                    let event = SseEvent::default().event("error").data(payload);
                    Some((Ok(event), (tokens, true)))
                }
                None => {
                    let event = SseEvent::default().event("end").data("");
                    Some((Ok(event), (tokens, true)))
                }
            }
        },
    );

    Ok(Sse::new(sse_stream))
}

/// Summarize approved materials
pub async fn summarize(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>> {
    let response = state.assistant.summarize(user.user_id, request).await?;
    Ok(Json(response))
}

/// Generate an exam from approved materials
pub async fn generate_exam(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<ExamRequest>,
) -> Result<Json<ExamResponse>> {
    let response = state.assistant.generate_exam(user.user_id, request).await?;
    Ok(Json(response))
}

#[derive(serde::Serialize)]
pub struct AdviseResponse {
    pub advice: String,
}

/// Study advisor passthrough
pub async fn advise(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<AdviseRequest>,
) -> Result<Json<AdviseResponse>> {
    let advice = state.assistant.advise(user.user_id, request).await?;
    Ok(Json(AdviseResponse { advice }))
}
