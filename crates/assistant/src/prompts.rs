//! Prompt assembly
//!
//! The numbered sources block built here is the single source of truth for
//! citation numbering: the same 1..N order flows into the stored references
//! and the response payload.

use studyforge_search::RetrievedChunk;

/// Fixed answer when retrieval finds nothing usable
pub const NO_MATERIAL_ANSWER: &str =
    "Not enough approved material to answer this question.";

/// Fixed message when summarization has nothing to work with
pub const NO_MATERIAL_SUMMARY: &str =
    "Not enough approved material to build a summary.";

/// Fixed message when exam generation has nothing to work with
pub const NO_MATERIAL_EXAM: &str =
    "Not enough approved material to generate an exam.";

/// User-facing fallback when exam generation fails for reasons other than
/// output truncation
pub const EXAM_FAILED_MESSAGE: &str =
    "Exam generation failed. Please retry, possibly with fewer questions.";

/// System prompt for grounded answering
pub const ANSWER_SYSTEM_PROMPT: &str =
    "You are a study assistant. Answer the student's question using ONLY the \
     numbered sources provided. If the sources do not contain enough \
     information, say so explicitly. Cite sources inline with bracketed \
     numbers matching the source numbers, e.g. [1] or [2].";

/// System prompt for the study advisor passthrough
pub const ADVISOR_SYSTEM_PROMPT: &str =
    "You are a study advisor. Give practical, encouraging advice about study \
     habits, planning, and exam preparation. Keep answers concise and \
     actionable.";

/// Build the numbered sources block: one entry per retrieved chunk in
/// retrieval-rank order, numbered 1..N.
pub fn build_sources_block(chunks: &[RetrievedChunk]) -> String {
    let mut block = String::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let pages = if chunk.page_start == chunk.page_end {
            format!("page {}", chunk.page_start)
        } else {
            format!("pages {}-{}", chunk.page_start, chunk.page_end)
        };

        block.push_str(&format!(
            "[{}] {} ({})\n{}\n\n",
            i + 1,
            chunk.material_title,
            pages,
            chunk.content
        ));
    }

    block
}

/// Derive a conversation title from the first question
pub fn conversation_title(question: &str) -> String {
    const MAX_TITLE_CHARS: usize = 80;

    let trimmed = question.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    format!("{}...", truncated.trim_end())
}

/// Synthetic retrieval query for summarization: the style shapes which
/// passages surface
pub fn summary_query(style: &str) -> String {
    format!(
        "key points, definitions, and central arguments for a {} summary of this material",
        style
    )
}

/// Task instruction for the summarization call
pub fn summary_instruction(style: &str) -> String {
    let shape = match style {
        "bullet" => "as a bullet-point list of the most important points",
        "outline" => "as a hierarchical outline with short section headers",
        "paragraph" => "as flowing paragraphs",
        other => other,
    };

    format!(
        "Summarize the numbered sources {} . Use only the provided sources and \
         cite the source number for each point, e.g. [1].",
        shape
    )
}

/// Synthetic retrieval query for exam generation
pub fn exam_query(difficulty: &str, exam_type: &str) -> String {
    format!(
        "facts, definitions, and concepts suitable for {} {} exam questions",
        difficulty, exam_type
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chunk(title: &str, page_start: i32, page_end: i32, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            material_title: title.to_string(),
            content: content.to_string(),
            chunk_index: 0,
            page_start,
            page_end,
            score: 0.9,
        }
    }

    #[test]
    fn test_sources_block_numbering_follows_rank_order() {
        let chunks = vec![
            chunk("Mechanics", 3, 3, "Newton's second law."),
            chunk("Mechanics", 7, 7, "Momentum is conserved."),
            chunk("Waves", 1, 2, "Superposition principle."),
        ];

        let block = build_sources_block(&chunks);

        let first = block.find("[1] Mechanics (page 3)").unwrap();
        let second = block.find("[2] Mechanics (page 7)").unwrap();
        let third = block.find("[3] Waves (pages 1-2)").unwrap();
        assert!(first < second && second < third);
        assert!(block.contains("Newton's second law."));
    }

    #[test]
    fn test_conversation_title_truncates() {
        let short = conversation_title("What is entropy?");
        assert_eq!(short, "What is entropy?");

        let long_question = "Why does ".repeat(30);
        let title = conversation_title(&long_question);
        assert!(title.chars().count() <= 83);
        assert!(title.ends_with("..."));
    }
}
