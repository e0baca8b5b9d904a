//! Exam generation
//!
//! Questions are generated in batches to respect output-token budgets, each
//! batch validated against a strict schema after a permissive normalization
//! step (options as array or map). A batch that under-delivers raises the
//! distinguished truncation error; ids are renumbered 1..count after
//! collection rather than trusted from the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use studyforge_common::errors::{AppError, Result};
use studyforge_common::llm::{chat_json, ChatMessage, ChatProvider};
use tracing::warn;

/// Questions generated per LLM call
pub const BATCH_SIZE: usize = 5;

const MIN_TOKEN_BUDGET: u32 = 800;
const MAX_TOKEN_BUDGET: u32 = 2000;
const MAX_PROMPT_CHARS: usize = 200;
const MAX_ANSWER_WORDS: usize = 30;
const MAX_KEYWORDS: usize = 5;

const OPTION_KEYS: [&str; 4] = ["A", "B", "C", "D"];

/// Question kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Mcq,
    Text,
}

/// One lettered option of a multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamOption {
    pub key: String,
    pub text: String,
}

/// A validated exam question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestion {
    pub id: u32,

    pub kind: QuestionKind,

    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<ExamOption>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<String>,

    #[serde(default)]
    pub correct_answer: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,

    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    1
}

/// The exam payload returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamJson {
    pub questions: Vec<ExamQuestion>,
}

/// Normalize loosely-typed options into the array form.
///
/// Accepts either an array of `{key, text}` objects or an object map
/// (`{"A": "...", ...}`); anything else is a schema violation. This runs
/// before strict validation so map-shaped model output is not rejected for
/// its shape alone.
pub fn normalize_options(raw: &Value) -> Result<Vec<ExamOption>> {
    match raw {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                serde_json::from_value::<ExamOption>(item.clone()).map_err(|e| {
                    AppError::LlmSchemaValidation {
                        message: format!("Invalid option entry: {}", e),
                    }
                })
            })
            .collect(),
        Value::Object(map) => {
            let mut options: Vec<ExamOption> = map
                .iter()
                .map(|(key, text)| {
                    let text = text.as_str().ok_or_else(|| AppError::LlmSchemaValidation {
                        message: format!("Option {} text is not a string", key),
                    })?;
                    Ok(ExamOption {
                        key: key.clone(),
                        text: text.to_string(),
                    })
                })
                .collect::<Result<_>>()?;
            options.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(options)
        }
        _ => Err(AppError::LlmSchemaValidation {
            message: "Options must be an array or an object map".to_string(),
        }),
    }
}

/// Parse and validate one raw question value
fn parse_question(mut raw: Value) -> Result<ExamQuestion> {
    if let Some(options) = raw.get("options") {
        let normalized = normalize_options(options)?;
        raw["options"] = serde_json::to_value(normalized)?;
    }

    let mut question: ExamQuestion =
        serde_json::from_value(raw).map_err(|e| AppError::LlmSchemaValidation {
            message: format!("Question does not match schema: {}", e),
        })?;

    if question.prompt.trim().is_empty() {
        return Err(AppError::LlmSchemaValidation {
            message: format!("Question {} has an empty prompt", question.id),
        });
    }
    if question.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(AppError::LlmSchemaValidation {
            message: format!(
                "Question {} prompt exceeds {} characters",
                question.id, MAX_PROMPT_CHARS
            ),
        });
    }

    match question.kind {
        QuestionKind::Mcq => validate_mcq(&mut question)?,
        QuestionKind::Text => validate_text(&question)?,
    }

    Ok(question)
}

fn validate_mcq(question: &mut ExamQuestion) -> Result<()> {
    let options = question
        .options
        .as_ref()
        .ok_or_else(|| AppError::LlmSchemaValidation {
            message: format!("MCQ question {} has no options", question.id),
        })?;

    let mut keys: Vec<&str> = options.iter().map(|o| o.key.as_str()).collect();
    keys.sort_unstable();
    if keys != OPTION_KEYS {
        return Err(AppError::LlmSchemaValidation {
            message: format!(
                "MCQ question {} must have exactly 4 options keyed A-D, got {:?}",
                question.id, keys
            ),
        });
    }

    let correct = question
        .correct_option
        .as_deref()
        .ok_or_else(|| AppError::LlmSchemaValidation {
            message: format!("MCQ question {} has no correctOption", question.id),
        })?;
    if !OPTION_KEYS.contains(&correct) {
        return Err(AppError::LlmSchemaValidation {
            message: format!(
                "MCQ question {} correctOption must be one of A-D, got {}",
                question.id, correct
            ),
        });
    }

    // Fill the answer text from the correct option when the model omitted it
    if question.correct_answer.trim().is_empty() {
        let correct_key = correct.to_string();
        if let Some(option) = options.iter().find(|o| o.key == correct_key) {
            question.correct_answer = option.text.clone();
        }
    }

    Ok(())
}

fn validate_text(question: &ExamQuestion) -> Result<()> {
    if question.correct_option.is_some() {
        return Err(AppError::LlmSchemaValidation {
            message: format!(
                "Text question {} must not carry a correctOption",
                question.id
            ),
        });
    }

    if question.correct_answer.trim().is_empty() {
        return Err(AppError::LlmSchemaValidation {
            message: format!("Text question {} has no correctAnswer", question.id),
        });
    }
    let words = question.correct_answer.split_whitespace().count();
    if words > MAX_ANSWER_WORDS {
        return Err(AppError::LlmSchemaValidation {
            message: format!(
                "Text question {} correctAnswer exceeds {} words",
                question.id, MAX_ANSWER_WORDS
            ),
        });
    }

    if let Some(keywords) = &question.keywords {
        if keywords.len() > MAX_KEYWORDS {
            return Err(AppError::LlmSchemaValidation {
                message: format!(
                    "Text question {} has more than {} keywords",
                    question.id, MAX_KEYWORDS
                ),
            });
        }
    }

    Ok(())
}

/// Parse one batch payload: an object with a `questions` array of exactly
/// `expected` entries. Fewer entries than requested is treated as output
/// truncation and raises the distinguished truncation error; extra entries
/// are trimmed. Model-supplied ids are checked against the expected sequence
/// but only warned about, since ids are renumbered after collection.
pub fn parse_batch(value: Value, expected: usize, start_id: u32) -> Result<Vec<ExamQuestion>> {
    let questions = value
        .get("questions")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| AppError::LlmSchemaValidation {
            message: "Batch payload must be an object with a questions array".to_string(),
        })?;

    if questions.len() < expected {
        return Err(AppError::LlmTruncated {
            requested: expected,
            received: questions.len(),
        });
    }
    if questions.len() > expected {
        warn!(
            expected = expected,
            received = questions.len(),
            "Batch returned extra questions, trimming"
        );
    }

    let mut parsed = Vec::with_capacity(expected);
    for (offset, raw) in questions.into_iter().take(expected).enumerate() {
        let question = parse_question(raw)?;
        let expected_id = start_id + offset as u32;
        if question.id != expected_id {
            warn!(
                expected_id = expected_id,
                model_id = question.id,
                "Model deviated from the requested id sequence"
            );
        }
        parsed.push(question);
    }

    Ok(parsed)
}

/// Output-token budget for one batch, scaled by batch size and question-type
/// verbosity, clamped to [800, 2000]
pub fn token_budget(take: usize, exam_type: &str) -> u32 {
    let per_question: u32 = match exam_type {
        "multiple-choice" => 300,
        _ => 200,
    };

    (per_question * take as u32).clamp(MIN_TOKEN_BUDGET, MAX_TOKEN_BUDGET)
}

fn batch_prompt(
    sources_block: &str,
    take: usize,
    start_id: u32,
    difficulty: &str,
    exam_type: &str,
) -> String {
    let kind_instruction = match exam_type {
        "multiple-choice" => "Every question must have kind \"mcq\", an options array of \
             exactly 4 entries with keys \"A\", \"B\", \"C\", \"D\", and a correctOption \
             that is one of those keys."
            .to_string(),
        _ => format!(
            "Every question must have kind \"text\", no correctOption, a \
             correctAnswer of at most {} words, and optionally up to {} keywords.",
            MAX_ANSWER_WORDS, MAX_KEYWORDS
        ),
    };

    format!(
        "Create exactly {take} {difficulty} exam questions grounded in the \
         numbered sources below. Respond with a JSON object of the form \
         {{\"questions\": [...]}}. Each question object has: id (integer, \
         starting at {start_id} and incrementing by one), kind, prompt (at most \
         {MAX_PROMPT_CHARS} characters), correctAnswer, optionally explanation, \
         and points (integer). {kind_instruction}\n\nSources:\n{sources_block}"
    )
}

/// Generate `count` questions in batches of [`BATCH_SIZE`].
///
/// A truncated batch propagates [`AppError::LlmTruncated`] unmodified so the
/// HTTP boundary can report the specific error code; callers convert other
/// failures into the generic user-facing retry message. After collection the
/// results are aligned to the requested total and renumbered 1..count.
pub async fn generate_exam_questions(
    llm: &dyn ChatProvider,
    sources_block: &str,
    count: usize,
    difficulty: &str,
    exam_type: &str,
) -> Result<Vec<ExamQuestion>> {
    let mut questions: Vec<ExamQuestion> = Vec::with_capacity(count);

    let mut start = 0;
    while start < count {
        let take = BATCH_SIZE.min(count - start);
        let start_id = (start + 1) as u32;
        let budget = token_budget(take, exam_type);

        let prompt = batch_prompt(sources_block, take, start_id, difficulty, exam_type);
        let value = chat_json(llm, &[ChatMessage::user(prompt)], Some(budget)).await?;

        let batch = parse_batch(value, take, start_id)?;
        questions.extend(batch);

        start += take;
    }

    questions.truncate(count);
    for (i, question) in questions.iter_mut().enumerate() {
        question.id = (i + 1) as u32;
    }

    Ok(questions)
}

/// Render a human-readable exam: numbered prompts with lettered options,
/// followed by an answer key.
pub fn render_exam_text(questions: &[ExamQuestion]) -> String {
    let mut text = String::from("Exam\n====\n\n");

    for question in questions {
        text.push_str(&format!("{}. {} ({} pt)\n", question.id, question.prompt, question.points));
        if let Some(options) = &question.options {
            for option in options {
                text.push_str(&format!("   {}) {}\n", option.key, option.text));
            }
        }
        text.push('\n');
    }

    text.push_str("Answer Key\n----------\n");
    for question in questions {
        match (&question.correct_option, &question.explanation) {
            (Some(key), Some(explanation)) => {
                text.push_str(&format!("{}. {} ({})\n", question.id, key, explanation));
            }
            (Some(key), None) => {
                text.push_str(&format!("{}. {}\n", question.id, key));
            }
            (None, _) => {
                text.push_str(&format!("{}. {}\n", question.id, question.correct_answer));
            }
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyforge_common::llm::MockChat;

    fn mcq_value(id: u32) -> Value {
        serde_json::json!({
            "id": id,
            "kind": "mcq",
            "prompt": format!("Question number {id}?"),
            "options": [
                {"key": "A", "text": "first"},
                {"key": "B", "text": "second"},
                {"key": "C", "text": "third"},
                {"key": "D", "text": "fourth"}
            ],
            "correctOption": "B",
            "correctAnswer": "second",
            "points": 2
        })
    }

    fn batch_json(ids: std::ops::RangeInclusive<u32>) -> String {
        let questions: Vec<Value> = ids.map(mcq_value).collect();
        serde_json::json!({ "questions": questions }).to_string()
    }

    #[test]
    fn test_normalize_options_from_map() {
        let raw = serde_json::json!({
            "B": "second", "A": "first", "D": "fourth", "C": "third"
        });
        let options = normalize_options(&raw).unwrap();
        let keys: Vec<&str> = options.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C", "D"]);
        assert_eq!(options[0].text, "first");
    }

    #[test]
    fn test_normalize_options_from_array_passthrough() {
        let raw = serde_json::json!([
            {"key": "A", "text": "first"},
            {"key": "B", "text": "second"}
        ]);
        let options = normalize_options(&raw).unwrap();
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_normalize_options_rejects_scalar() {
        let err = normalize_options(&serde_json::json!("A")).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_mcq_requires_four_options() {
        let mut value = mcq_value(1);
        value["options"].as_array_mut().unwrap().pop();
        let err = parse_question(value).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_mcq_correct_option_must_be_in_set() {
        let mut value = mcq_value(1);
        value["correctOption"] = serde_json::json!("E");
        let err = parse_question(value).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_mcq_answer_text_filled_from_option() {
        let mut value = mcq_value(1);
        value["correctAnswer"] = serde_json::json!("");
        let question = parse_question(value).unwrap();
        assert_eq!(question.correct_answer, "second");
    }

    #[test]
    fn test_text_question_forbids_correct_option() {
        let value = serde_json::json!({
            "id": 1,
            "kind": "text",
            "prompt": "Define entropy.",
            "correctOption": "A",
            "correctAnswer": "A measure of disorder."
        });
        let err = parse_question(value).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_text_answer_word_limit() {
        let value = serde_json::json!({
            "id": 1,
            "kind": "text",
            "prompt": "Define entropy.",
            "correctAnswer": "word ".repeat(31).trim(),
        });
        let err = parse_question(value).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_text_keyword_limit() {
        let value = serde_json::json!({
            "id": 1,
            "kind": "text",
            "prompt": "Define entropy.",
            "correctAnswer": "A measure of disorder.",
            "keywords": ["a", "b", "c", "d", "e", "f"]
        });
        let err = parse_question(value).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_prompt_length_limit() {
        let mut value = mcq_value(1);
        value["prompt"] = serde_json::json!("x".repeat(201));
        let err = parse_question(value).unwrap_err();
        assert!(matches!(err, AppError::LlmSchemaValidation { .. }));
    }

    #[test]
    fn test_token_budget_clamps() {
        assert_eq!(token_budget(5, "multiple-choice"), 1500);
        assert_eq!(token_budget(5, "text"), 1000);
        // Small batches clamp up, large verbosity clamps down
        assert_eq!(token_budget(2, "multiple-choice"), 800);
        assert_eq!(token_budget(1, "text"), 800);
        assert!(token_budget(5, "multiple-choice") <= 2000);
    }

    #[test]
    fn test_parse_batch_under_delivery_is_truncation() {
        let payload: Value = serde_json::from_str(&batch_json(1..=3)).unwrap();
        let err = parse_batch(payload, 5, 1).unwrap_err();
        match err {
            AppError::LlmTruncated { requested, received } => {
                assert_eq!(requested, 5);
                assert_eq!(received, 3);
            }
            other => panic!("expected truncation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_generate_seven_questions_in_two_batches() {
        let mock = MockChat::new(vec![&batch_json(1..=5), &batch_json(6..=7)]);

        let questions = generate_exam_questions(&mock, "[1] Notes (page 1)\ntext", 7, "medium", "multiple-choice")
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(questions.len(), 7);
        let ids: Vec<u32> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());

        for question in &questions {
            let options = question.options.as_ref().unwrap();
            let mut keys: Vec<&str> = options.iter().map(|o| o.key.as_str()).collect();
            keys.sort_unstable();
            assert_eq!(keys, vec!["A", "B", "C", "D"]);
            assert!(matches!(question.correct_option.as_deref(), Some("A" | "B" | "C" | "D")));
        }
    }

    #[tokio::test]
    async fn test_generate_renumbers_noncompliant_ids() {
        // The model starts the second batch at 1 instead of 6
        let mock = MockChat::new(vec![&batch_json(1..=5), &batch_json(1..=2)]);

        let questions = generate_exam_questions(&mock, "sources", 7, "easy", "multiple-choice")
            .await
            .unwrap();

        let ids: Vec<u32> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_generate_propagates_truncation() {
        let mock = MockChat::new(vec![&batch_json(1..=2)]);

        let err = generate_exam_questions(&mock, "sources", 5, "hard", "multiple-choice")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::LlmTruncated { requested: 5, received: 2 }));
    }

    #[test]
    fn test_render_exam_text() {
        let payload: Value = serde_json::from_str(&batch_json(1..=2)).unwrap();
        let questions = parse_batch(payload, 2, 1).unwrap();

        let text = render_exam_text(&questions);

        assert!(text.contains("1. Question number 1?"));
        assert!(text.contains("   A) first"));
        assert!(text.contains("Answer Key"));
        assert!(text.contains("1. B"));
    }
}
