//! Prompt templates and response parsing for answers and summaries.

use lecture_types::{LectureChunk, ScoredChunk};

pub const ANSWER_SYSTEM_PROMPT: &str = "You are an intelligent teaching assistant helping university students understand lecture content. Your role is to:
1. Synthesize information from multiple lecture sources
2. Explain concepts clearly and accurately
3. Show how ideas connect across lectures
4. Acknowledge when information is incomplete
5. Maintain academic rigor while being accessible";

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are an expert at synthesizing educational content across multiple sources.";

pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant information in the uploaded lectures for this module.";

pub const GENERATION_FAILED_ANSWER: &str =
    "I encountered an error while generating the answer. Please try again.";

pub const EMBEDDING_FAILED_ANSWER: &str =
    "I couldn't process your question right now. Please try again.";

pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable";

/// Context block for an answer: one tagged entry per ranked chunk.
pub fn answer_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!(
                "[Source {} - {}, Week {}, Slide {}]\n{}",
                i + 1,
                scored.item.lecture_title,
                scored.item.week_number,
                scored.item.chunk.slide_number,
                scored.item.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        r#"Answer the following question based on the provided lecture content. Use information from the sources to provide a comprehensive answer. When referencing information, mention which source (e.g., "According to Source 1...").

Question: {question}

Lecture Content:
{context}

Instructions:
- Provide a clear, well-structured answer
- Cite sources when making specific claims
- If information from multiple lectures is relevant, explain how concepts connect
- If the sources don't contain enough information to fully answer the question, acknowledge this
- Maintain academic tone appropriate for university-level content

Answer:"#
    )
}

/// Context block for a topic summary, in week then slide order.
pub fn summary_context(chunks: &[LectureChunk]) -> String {
    chunks
        .iter()
        .map(|item| {
            format!(
                "[Week {} - {}, Slide {}]\n{}",
                item.week_number, item.lecture_title, item.chunk.slide_number, item.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn summary_prompt(topic_name: &str, description: &str, context: &str) -> String {
    format!(
        r#"Provide a comprehensive summary of the topic "{topic_name}" based on how it is presented across multiple lectures.

Topic Description: {description}

Lecture Content:
{context}

Please provide:
1. A synthesis of how this topic is introduced and developed across the lectures
2. Key concepts and definitions
3. How the topic evolves or is applied in later lectures
4. 3-5 bullet points of the most important takeaways

Format your response as:
SUMMARY: <comprehensive summary>
KEY POINTS:
- <point 1>
- <point 2>
- <point 3>
..."#
    )
}

/// Split a summary response into its summary text and key points.
///
/// Lines after `SUMMARY:` extend the summary until `KEY POINTS:`. In the
/// points section, `-` lines are points and any other non-empty line
/// continues the summary. Without a usable summary the whole trimmed
/// response becomes the summary.
pub fn parse_summary_response(response: &str) -> (String, Vec<String>) {
    let mut summary_parts: Vec<&str> = Vec::new();
    let mut key_points = Vec::new();
    let mut in_summary = false;
    let mut in_key_points = false;

    for line in response.trim().lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SUMMARY:") {
            in_summary = true;
            in_key_points = false;
            summary_parts.push(rest.trim());
        } else if line.starts_with("KEY POINTS:") {
            in_summary = false;
            in_key_points = true;
        } else if in_key_points {
            if let Some(point) = line.strip_prefix('-') {
                key_points.push(point.trim().to_string());
            } else if !line.is_empty() {
                summary_parts.push(line);
            }
        } else if in_summary && !line.is_empty() {
            summary_parts.push(line);
        }
    }

    let summary = summary_parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if summary.is_empty() {
        (response.trim().to_string(), key_points)
    } else {
        (summary, key_points)
    }
}

/// Truncate to `max_chars` characters, appending "..." when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &content[..byte_index]),
        None => content.to_string(),
    }
}

/// Round a similarity score to three decimal places.
pub fn round_score(similarity: f32) -> f64 {
    (f64::from(similarity) * 1000.0).round() / 1000.0
}
