//! Topic labels from the generation gateway with a fixed fallback.

use std::sync::Arc;
use std::time::Duration;

use lecture_generation::{generate_with_timeout, GenerationOptions, TextGenerator};
use lecture_types::{GenerationSettings, LectureChunk, TopicsSettings};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{debug, warn};

pub const LABEL_SYSTEM_PROMPT: &str =
    "You are an expert at analyzing educational content and identifying key topics.";

pub const FALLBACK_DESCRIPTION: &str = "Auto-generated topic";

/// Name and description for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLabel {
    pub name: String,
    pub description: String,
}

impl TopicLabel {
    /// Label used when the generator cannot name a cluster.
    pub fn fallback(cluster_id: i32) -> Self {
        Self {
            name: format!("Topic {cluster_id}"),
            description: FALLBACK_DESCRIPTION.to_string(),
        }
    }
}

/// Pick up to `sample_size` chunks without replacement.
pub fn sample_chunks<'a>(
    chunks: &[&'a LectureChunk],
    sample_size: usize,
    rng: &mut StdRng,
) -> Vec<&'a LectureChunk> {
    chunks
        .choose_multiple(rng, sample_size.min(chunks.len()))
        .copied()
        .collect()
}

/// Prompt asking for a `TOPIC:` / `DESCRIPTION:` pair.
pub fn label_prompt(samples: &[&LectureChunk], preview_chars: usize) -> String {
    let excerpts = samples
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let excerpt: String = item.chunk.content.chars().take(preview_chars).collect();
            format!("Chunk {}: {}...", i + 1, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Analyze these text excerpts from university lecture slides and identify the main topic.

{excerpts}

Provide:
1. A concise topic name (2-5 words)
2. A brief description (1 sentence)

Format your response as:
TOPIC: <topic name>
DESCRIPTION: <description>"#
    )
}

/// Parse a label response. `None` when no usable topic name is present.
pub fn parse_label_response(response: &str, max_label_length: usize) -> Option<TopicLabel> {
    let mut name = None;
    let mut description = String::new();

    for line in response.trim().lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("TOPIC:") {
            name = Some(clean_label(rest, max_label_length));
        } else if let Some(rest) = line.strip_prefix("DESCRIPTION:") {
            description = rest.trim().to_string();
        }
    }

    name.filter(|n| !n.is_empty())
        .map(|name| TopicLabel { name, description })
}

/// Trim whitespace and quotes, then cut to `max_len` characters at a word
/// boundary where possible.
fn clean_label(raw: &str, max_len: usize) -> String {
    let cleaned = raw.trim().trim_matches('"').trim_matches('\'').trim();
    let Some((cut, _)) = cleaned.char_indices().nth(max_len) else {
        return cleaned.to_string();
    };
    let head = &cleaned[..cut];
    match head.rfind(' ') {
        Some(space) if space > 0 => head[..space].trim_end().to_string(),
        _ => head.to_string(),
    }
}

/// Names clusters through the generation gateway.
pub struct TopicLabeler {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    timeout: Duration,
    preview_chars: usize,
    max_label_length: usize,
}

impl TopicLabeler {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        topics: &TopicsSettings,
        generation: &GenerationSettings,
    ) -> Self {
        Self {
            generator,
            options: GenerationOptions::new(generation.temperature, generation.label_max_tokens),
            timeout: Duration::from_secs(generation.timeout_secs),
            preview_chars: topics.label_preview_chars,
            max_label_length: topics.max_label_length,
        }
    }

    /// Label one cluster from its sampled chunks. Never fails.
    pub async fn label(&self, cluster_id: i32, samples: &[&LectureChunk]) -> TopicLabel {
        let prompt = label_prompt(samples, self.preview_chars);

        match generate_with_timeout(
            self.generator.as_ref(),
            &prompt,
            Some(LABEL_SYSTEM_PROMPT),
            &self.options,
            self.timeout,
        )
        .await
        {
            Ok(response) => match parse_label_response(&response, self.max_label_length) {
                Some(label) => {
                    debug!(cluster_id, name = %label.name, "Labeled cluster");
                    label
                }
                None => {
                    warn!(cluster_id, "Unparseable label response, using fallback");
                    TopicLabel::fallback(cluster_id)
                }
            },
            Err(e) => {
                warn!(cluster_id, error = %e, "Labeling failed, using fallback");
                TopicLabel::fallback(cluster_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lecture_generation::MockGenerator;
    use lecture_types::{Chunk, Lecture};
    use rand::SeedableRng;

    fn items(contents: &[&str]) -> Vec<LectureChunk> {
        let lecture = Lecture::new("COMP3001", 1, "Intro", "intro.pdf");
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| LectureChunk {
                chunk: Chunk::new(&lecture, *c, i as u32 + 1),
                lecture_title: lecture.title.clone(),
                week_number: 1,
            })
            .collect()
    }

    fn labeler(generator: MockGenerator) -> TopicLabeler {
        TopicLabeler::new(
            Arc::new(generator),
            &TopicsSettings::default(),
            &GenerationSettings::default(),
        )
    }

    #[test]
    fn test_parse_label_response() {
        let label =
            parse_label_response("TOPIC: Graph Search\nDESCRIPTION: Visiting nodes.", 100).unwrap();
        assert_eq!(label.name, "Graph Search");
        assert_eq!(label.description, "Visiting nodes.");

        let label = parse_label_response("Sure!\nTOPIC: \"Hashing\"", 100).unwrap();
        assert_eq!(label.name, "Hashing");
        assert_eq!(label.description, "");

        assert!(parse_label_response("No markers here", 100).is_none());
        assert!(parse_label_response("TOPIC:   \nDESCRIPTION: x", 100).is_none());
    }

    #[test]
    fn test_long_label_cut_at_word() {
        let label = parse_label_response("TOPIC: Dynamic programming on trees", 15).unwrap();
        assert_eq!(label.name, "Dynamic");
    }

    #[test]
    fn test_prompt_truncates_excerpts() {
        let items = items(&["abcdefghij", "short"]);
        let refs: Vec<&LectureChunk> = items.iter().collect();
        let prompt = label_prompt(&refs, 4);
        assert!(prompt.contains("Chunk 1: abcd...\n\nChunk 2: shor..."));
        assert!(prompt.ends_with("DESCRIPTION: <description>"));
    }

    #[test]
    fn test_sampling_is_seeded_and_bounded() {
        let items = items(&["a", "b", "c", "d", "e", "f", "g"]);
        let refs: Vec<&LectureChunk> = items.iter().collect();

        let first = sample_chunks(&refs, 5, &mut StdRng::seed_from_u64(42));
        let second = sample_chunks(&refs, 5, &mut StdRng::seed_from_u64(42));
        assert_eq!(first.len(), 5);
        let ids = |v: &[&LectureChunk]| v.iter().map(|c| c.chunk.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));

        let mut unique = ids(&first);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);

        assert_eq!(sample_chunks(&refs[..2], 5, &mut StdRng::seed_from_u64(1)).len(), 2);
    }

    #[tokio::test]
    async fn test_label_uses_generator() {
        let generator = MockGenerator::with_response("TOPIC: Sorting\nDESCRIPTION: Ordering data.");
        let labeler = labeler(generator);
        let items = items(&["merge sort"]);
        let refs: Vec<&LectureChunk> = items.iter().collect();

        let label = labeler.label(0, &refs).await;
        assert_eq!(label.name, "Sorting");
        assert_eq!(label.description, "Ordering data.");
    }

    #[tokio::test]
    async fn test_label_fallbacks() {
        let items = items(&["merge sort"]);
        let refs: Vec<&LectureChunk> = items.iter().collect();

        let failing = labeler(MockGenerator::failing());
        assert_eq!(failing.label(3, &refs).await, TopicLabel::fallback(3));

        let rambling = labeler(MockGenerator::with_response("I am not sure."));
        let label = rambling.label(1, &refs).await;
        assert_eq!(label.name, "Topic 1");
        assert_eq!(label.description, "Auto-generated topic");
    }
}
