//! Per-lecture appearance statistics for a cluster.

use std::collections::HashMap;

use lecture_types::{AppearanceDetail, LectureChunk};

/// Group a cluster's chunks by lecture: frequency is the chunk count and
/// first_slide the lowest slide number. Ordered by week, then lecture ID.
pub fn track_appearances(chunks: &[&LectureChunk]) -> Vec<AppearanceDetail> {
    let mut by_lecture: HashMap<&str, AppearanceDetail> = HashMap::new();

    for item in chunks {
        by_lecture
            .entry(item.chunk.lecture_id.as_str())
            .and_modify(|a| {
                a.frequency += 1;
                a.first_slide = a.first_slide.min(item.chunk.slide_number);
            })
            .or_insert_with(|| AppearanceDetail {
                lecture_id: item.chunk.lecture_id.clone(),
                lecture_title: item.lecture_title.clone(),
                week_number: item.week_number,
                frequency: 1,
                first_slide: item.chunk.slide_number,
            });
    }

    let mut appearances: Vec<AppearanceDetail> = by_lecture.into_values().collect();
    appearances.sort_by(|a, b| {
        a.week_number
            .cmp(&b.week_number)
            .then_with(|| a.lecture_id.cmp(&b.lecture_id))
    });
    appearances
}
