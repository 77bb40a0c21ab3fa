//! Topic types.
//!
//! Topics are scoped to a module and fully replaced each time detection runs.
//! A [`TopicAppearance`] records how often a topic occurs in one lecture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::lecture::normalize_module_code;

/// A named cluster of related chunks within one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// ULID assigned at creation
    pub topic_id: String,
    /// Module code, always uppercase
    pub module_code: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Create a new topic with a fresh ID.
    pub fn new(
        module_code: &str,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            topic_id: Ulid::new().to_string(),
            module_code: normalize_module_code(module_code),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Persisted link between a topic and one lecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAppearance {
    pub topic_id: String,
    pub lecture_id: String,
    /// Number of the topic's chunks in this lecture
    pub frequency: u32,
    /// Lowest slide number among those chunks
    pub first_slide: u32,
}

impl TopicAppearance {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// An appearance joined with its lecture's title and week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceDetail {
    pub lecture_id: String,
    pub lecture_title: String,
    pub week_number: u32,
    pub frequency: u32,
    pub first_slide: u32,
}

/// A topic together with its appearances, ordered by week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWithAppearances {
    pub topic: Topic,
    pub appearances: Vec<AppearanceDetail>,
}

impl TopicWithAppearances {
    /// Earliest week the topic appears in.
    pub fn earliest_week(&self) -> Option<u32> {
        self.appearances.iter().map(|a| a.week_number).min()
    }

    /// Distinct weeks the topic appears in, ascending.
    pub fn weeks(&self) -> Vec<u32> {
        let mut weeks: Vec<u32> = self.appearances.iter().map(|a| a.week_number).collect();
        weeks.sort_unstable();
        weeks.dedup();
        weeks
    }

    /// Persistable appearance rows for this topic.
    pub fn appearance_rows(&self) -> Vec<TopicAppearance> {
        self.appearances
            .iter()
            .map(|a| TopicAppearance {
                topic_id: self.topic.topic_id.clone(),
                lecture_id: a.lecture_id.clone(),
                frequency: a.frequency,
                first_slide: a.first_slide,
            })
            .collect()
    }
}
