//! Graph view of a module's topics.

use lecture_types::TopicWithAppearances;
use serde::{Deserialize, Serialize};

use crate::prerequisites::{infer_prerequisites, PrerequisiteEdge};

const NODE_COLOR: &str = "#646cff";

/// One topic in the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNode {
    pub id: String,
    pub label: String,
    /// Twice the number of lectures the topic appears in
    pub size: usize,
    pub color: String,
}

/// Nodes plus prerequisite edges, ready for graph rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMap {
    pub nodes: Vec<TopicNode>,
    pub edges: Vec<PrerequisiteEdge>,
}

impl TopicMap {
    pub fn build(topics: &[TopicWithAppearances]) -> Self {
        let nodes = topics
            .iter()
            .map(|t| TopicNode {
                id: t.topic.topic_id.clone(),
                label: t.topic.name.clone(),
                size: t.appearances.len() * 2,
                color: NODE_COLOR.to_string(),
            })
            .collect();

        Self {
            nodes,
            edges: infer_prerequisites(topics),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
