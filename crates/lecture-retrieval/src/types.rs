//! Request and response types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A question against one module's lectures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,

    /// Module code, matched case-insensitively
    pub module_code: String,

    /// Number of chunks to retrieve; the configured default when unset
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Restrict retrieval to lectures up to `current_week`
    #[serde(default = "default_temporal_filter")]
    pub temporal_filter: bool,

    /// Only effective together with `temporal_filter`
    #[serde(default)]
    pub current_week: Option<u32>,
}

fn default_temporal_filter() -> bool {
    true
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, module_code: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            module_code: module_code.into(),
            top_k: None,
            temporal_filter: true,
            current_week: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Only consider lectures up to and including `week`.
    pub fn up_to_week(mut self, week: u32) -> Self {
        self.temporal_filter = true;
        self.current_week = Some(week);
        self
    }

    /// Search every week regardless of `current_week`.
    pub fn without_temporal_filter(mut self) -> Self {
        self.temporal_filter = false;
        self
    }

    /// Week bound to apply, if the filter is in effect. Week 0 means the
    /// term has not started and bounds nothing.
    pub fn week_bound(&self) -> Option<u32> {
        if self.temporal_filter {
            self.current_week.filter(|&week| week > 0)
        } else {
            None
        }
    }
}

/// A chunk cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub lecture_title: String,
    pub week_number: u32,
    pub slide_number: u32,

    /// Content preview, truncated with a trailing "..."
    pub content: String,

    /// Cosine similarity rounded to three decimals
    pub similarity_score: f64,
}

/// Answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,

    /// Cited chunks, most similar first
    pub sources: Vec<SourceCitation>,

    /// Wall time spent answering
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// A lecture where a summarized topic appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySource {
    pub lecture_title: String,
    pub week_number: u32,
    pub frequency: u32,
}

/// Cross-lecture summary of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic_name: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub sources: Vec<SummarySource>,
}

/// Serialize a [`Duration`] as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
