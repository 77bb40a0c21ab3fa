//! Prerequisite inference from temporal co-occurrence.
//!
//! Topic A is a prerequisite of topic B when A first appears in an
//! earlier week than B and the two share at least one week. Every
//! qualifying ordered pair becomes an edge; no cycle breaking or
//! transitive reduction is applied.

use std::collections::BTreeSet;

use lecture_types::TopicWithAppearances;
use serde::{Deserialize, Serialize};

/// Kind of relation between two topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Prerequisite,
}

/// Directed edge between two topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteEdge {
    /// Earlier topic
    pub source: String,
    /// Later topic
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

/// Infer prerequisite edges across every ordered pair of topics.
///
/// Topics without appearances are skipped. Edges are emitted in input
/// order of their source, then target.
pub fn infer_prerequisites(topics: &[TopicWithAppearances]) -> Vec<PrerequisiteEdge> {
    let timelines: Vec<(&str, u32, BTreeSet<u32>)> = topics
        .iter()
        .filter_map(|t| {
            let earliest = t.earliest_week()?;
            Some((
                t.topic.topic_id.as_str(),
                earliest,
                t.weeks().into_iter().collect(),
            ))
        })
        .collect();

    let mut edges = Vec::new();
    for (source, source_first, source_weeks) in &timelines {
        for (target, target_first, target_weeks) in &timelines {
            if source_first < target_first && !source_weeks.is_disjoint(target_weeks) {
                edges.push(PrerequisiteEdge {
                    source: source.to_string(),
                    target: target.to_string(),
                    edge_type: EdgeType::Prerequisite,
                });
            }
        }
    }
    edges
}
