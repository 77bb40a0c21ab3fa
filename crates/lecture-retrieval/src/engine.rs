//! Question answering and topic summaries over the chunk store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lecture_embeddings::EmbeddingGateway;
use lecture_generation::{generate_with_timeout, GenerationOptions, TextGenerator};
use lecture_storage::Storage;
use lecture_types::{normalize_module_code, GenerationSettings, RetrievalSettings, ScoredChunk};
use tracing::{debug, info, instrument, warn};

use crate::error::RetrievalError;
use crate::prompts::{
    answer_context, answer_prompt, parse_summary_response, preview, round_score, summary_context,
    summary_prompt, ANSWER_SYSTEM_PROMPT, EMBEDDING_FAILED_ANSWER, GENERATION_FAILED_ANSWER,
    NO_RESULTS_ANSWER, SUMMARY_SYSTEM_PROMPT, SUMMARY_UNAVAILABLE,
};
use crate::types::{QueryAnswer, QueryRequest, SourceCitation, SummarySource, TopicSummary};

/// Retrieval engine: ranked, temporally filtered chunks turned into cited
/// answers, plus cross-lecture topic summaries.
pub struct RetrievalEngine {
    storage: Arc<Storage>,
    /// Absent for engines that only summarize
    embedder: Option<Arc<dyn EmbeddingGateway>>,
    generator: Arc<dyn TextGenerator>,
    settings: RetrievalSettings,
    generation_timeout: Duration,
    answer_options: GenerationOptions,
    summary_options: GenerationOptions,
}

impl RetrievalEngine {
    pub fn new(
        storage: Arc<Storage>,
        embedder: Arc<dyn EmbeddingGateway>,
        generator: Arc<dyn TextGenerator>,
        settings: RetrievalSettings,
        generation: &GenerationSettings,
    ) -> Self {
        Self::build(storage, Some(embedder), generator, settings, generation)
    }

    /// An engine for topic summaries alone. Questions asked of it get the
    /// embedding-failure fallback answer.
    pub fn for_summaries(
        storage: Arc<Storage>,
        generator: Arc<dyn TextGenerator>,
        settings: RetrievalSettings,
        generation: &GenerationSettings,
    ) -> Self {
        Self::build(storage, None, generator, settings, generation)
    }

    fn build(
        storage: Arc<Storage>,
        embedder: Option<Arc<dyn EmbeddingGateway>>,
        generator: Arc<dyn TextGenerator>,
        settings: RetrievalSettings,
        generation: &GenerationSettings,
    ) -> Self {
        Self {
            storage,
            embedder,
            generator,
            settings,
            generation_timeout: Duration::from_secs(generation.timeout_secs),
            answer_options: GenerationOptions::new(
                generation.temperature,
                generation.answer_max_tokens,
            ),
            summary_options: GenerationOptions::new(
                generation.temperature,
                generation.summary_max_tokens,
            ),
        }
    }

    /// Answer a question from the module's most similar chunks.
    ///
    /// Gateway failures produce a fixed fallback answer; only invalid input
    /// and store failures are returned as errors.
    #[instrument(skip(self, request), fields(module = %request.module_code))]
    pub async fn answer(&self, request: QueryRequest) -> Result<QueryAnswer, RetrievalError> {
        let start = Instant::now();

        let question = request.question.trim();
        if question.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        let module = normalize_module_code(&request.module_code);
        if module.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "module code must not be empty".to_string(),
            ));
        }
        let top_k = request.top_k.unwrap_or(self.settings.default_top_k);
        if top_k == 0 || top_k > self.settings.max_top_k {
            return Err(RetrievalError::InvalidInput(format!(
                "top_k must be between 1 and {}, got {}",
                self.settings.max_top_k, top_k
            )));
        }
        let max_week = request.week_bound();

        let embedded = match &self.embedder {
            Some(embedder) => embedder.embed_one(question).await.map_err(|e| e.to_string()),
            None => Err("no embedding gateway configured".to_string()),
        };
        let query_embedding = match embedded {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Question embedding failed, returning fallback");
                return Ok(QueryAnswer {
                    answer: EMBEDDING_FAILED_ANSWER.to_string(),
                    sources: Vec::new(),
                    elapsed: start.elapsed(),
                });
            }
        };

        let chunks = self
            .storage
            .search_similar(&module, &query_embedding, max_week, top_k)?;

        if chunks.is_empty() {
            info!(max_week = ?max_week, "No chunks matched");
            return Ok(QueryAnswer {
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: Vec::new(),
                elapsed: start.elapsed(),
            });
        }
        debug!(retrieved = chunks.len(), "Retrieved chunks");

        let answer = self.generate_answer(question, &chunks).await;
        let sources = self.format_sources(&chunks);
        let elapsed = start.elapsed();

        info!(
            sources = sources.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Answered question"
        );
        Ok(QueryAnswer {
            answer,
            sources,
            elapsed,
        })
    }

    async fn generate_answer(&self, question: &str, chunks: &[ScoredChunk]) -> String {
        let prompt = answer_prompt(question, &answer_context(chunks));

        match generate_with_timeout(
            self.generator.as_ref(),
            &prompt,
            Some(ANSWER_SYSTEM_PROMPT),
            &self.answer_options,
            self.generation_timeout,
        )
        .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "Answer generation failed");
                GENERATION_FAILED_ANSWER.to_string()
            }
        }
    }

    fn format_sources(&self, chunks: &[ScoredChunk]) -> Vec<SourceCitation> {
        chunks
            .iter()
            .map(|scored| SourceCitation {
                lecture_title: scored.item.lecture_title.clone(),
                week_number: scored.item.week_number,
                slide_number: scored.item.chunk.slide_number,
                content: preview(&scored.item.chunk.content, self.settings.source_preview_chars),
                similarity_score: round_score(scored.similarity),
            })
            .collect()
    }

    /// Summarize a topic from the chunks of every lecture it appears in.
    #[instrument(skip(self))]
    pub async fn summarize(
        &self,
        topic_id: &str,
        module_code: &str,
    ) -> Result<TopicSummary, RetrievalError> {
        let module = normalize_module_code(module_code);
        if module.is_empty() || topic_id.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "topic id and module code are required".to_string(),
            ));
        }

        let Some(entry) = self.storage.get_topic_with_appearances(&module, topic_id)? else {
            return Err(RetrievalError::NotFound(format!(
                "topic {topic_id} in module {module}"
            )));
        };
        let topic = entry.topic;

        let lecture_ids: Vec<String> = entry
            .appearances
            .iter()
            .map(|a| a.lecture_id.clone())
            .collect();
        let chunks =
            self.storage
                .lecture_chunks(&module, &lecture_ids, self.settings.summary_chunk_limit)?;
        debug!(chunks = chunks.len(), lectures = lecture_ids.len(), "Gathered topic context");

        let prompt = summary_prompt(&topic.name, &topic.description, &summary_context(&chunks));
        let response = generate_with_timeout(
            self.generator.as_ref(),
            &prompt,
            Some(SUMMARY_SYSTEM_PROMPT),
            &self.summary_options,
            self.generation_timeout,
        )
        .await;

        match response {
            Ok(text) => {
                let (summary, key_points) = parse_summary_response(&text);
                info!(key_points = key_points.len(), "Summarized topic");
                Ok(TopicSummary {
                    topic_name: topic.name,
                    summary,
                    key_points,
                    sources: entry
                        .appearances
                        .into_iter()
                        .map(|a| SummarySource {
                            lecture_title: a.lecture_title,
                            week_number: a.week_number,
                            frequency: a.frequency,
                        })
                        .collect(),
                })
            }
            Err(e) => {
                warn!(error = %e, "Summary generation failed, using stored description");
                let summary = if topic.description.trim().is_empty() {
                    SUMMARY_UNAVAILABLE.to_string()
                } else {
                    topic.description
                };
                Ok(TopicSummary {
                    topic_name: topic.name,
                    summary,
                    key_points: Vec::new(),
                    sources: Vec::new(),
                })
            }
        }
    }
}
