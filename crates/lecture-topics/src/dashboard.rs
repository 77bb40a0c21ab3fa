//! Dashboard statistics across and within modules.

use lecture_storage::Storage;
use lecture_types::{normalize_module_code, Lecture};
use serde::Serialize;

use crate::error::TopicsError;

const RECENT_UPLOADS: usize = 5;

/// Totals over every module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_lectures: u64,
    pub total_topics: u64,
    /// Module codes, sorted
    pub modules: Vec<String>,
    /// Most recently uploaded lectures, newest first
    pub recent_uploads: Vec<Lecture>,
}

/// Totals for one module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDashboard {
    pub module_code: String,
    pub total_lectures: usize,
    pub total_topics: usize,
    /// Distinct weeks with at least one lecture, ascending
    pub weeks_covered: Vec<u32>,
    /// Lectures ordered by week
    pub lectures: Vec<Lecture>,
}

pub fn overall_stats(storage: &Storage) -> Result<DashboardStats, TopicsError> {
    let stats = storage.get_stats()?;
    let modules = storage.list_modules()?;

    let mut lectures = Vec::new();
    for module in &modules {
        lectures.extend(storage.list_lectures(module)?);
    }
    lectures.sort_by(|a, b| {
        b.uploaded_at
            .cmp(&a.uploaded_at)
            .then_with(|| b.lecture_id.cmp(&a.lecture_id))
    });
    lectures.truncate(RECENT_UPLOADS);

    Ok(DashboardStats {
        total_lectures: stats.lecture_count,
        total_topics: stats.topic_count,
        modules,
        recent_uploads: lectures,
    })
}

/// Statistics for one module. NotFound when it has no lectures.
pub fn module_stats(storage: &Storage, module_code: &str) -> Result<ModuleDashboard, TopicsError> {
    let module = normalize_module_code(module_code);
    if module.is_empty() {
        return Err(TopicsError::InvalidInput(
            "module code must not be empty".to_string(),
        ));
    }

    let lectures = storage.list_lectures(&module)?;
    if lectures.is_empty() {
        return Err(TopicsError::NotFound(format!(
            "No lectures found for module {module}"
        )));
    }

    let mut weeks_covered: Vec<u32> = lectures.iter().map(|l| l.week_number).collect();
    weeks_covered.sort_unstable();
    weeks_covered.dedup();

    let total_topics = storage.list_topics(&module)?.len();

    Ok(ModuleDashboard {
        module_code: module,
        total_lectures: lectures.len(),
        total_topics,
        weeks_covered,
        lectures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lecture_types::{Topic, TopicWithAppearances};
    use tempfile::TempDir;

    fn storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), 3).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_overall_stats() {
        let (_dir, storage) = storage();
        for (module, week) in [("COMP3001", 1), ("COMP3001", 2), ("MATH1001", 1)] {
            storage
                .put_lecture(&Lecture::new(module, week, format!("{module} week {week}"), "f.pdf"))
                .unwrap();
        }
        storage
            .replace_topics(
                "MATH1001",
                &[TopicWithAppearances {
                    topic: Topic::new("MATH1001", "Limits", ""),
                    appearances: vec![],
                }],
            )
            .unwrap();

        let stats = overall_stats(&storage).unwrap();
        assert_eq!(stats.total_lectures, 3);
        assert_eq!(stats.total_topics, 1);
        assert_eq!(stats.modules, vec!["COMP3001", "MATH1001"]);
        assert_eq!(stats.recent_uploads.len(), 3);
    }

    #[test]
    fn test_recent_uploads_capped() {
        let (_dir, storage) = storage();
        for week in 1..=7 {
            storage
                .put_lecture(&Lecture::new("COMP3001", week, format!("Week {week}"), "f.pdf"))
                .unwrap();
        }
        let stats = overall_stats(&storage).unwrap();
        assert_eq!(stats.recent_uploads.len(), 5);
        for pair in stats.recent_uploads.windows(2) {
            assert!(pair[0].uploaded_at >= pair[1].uploaded_at);
        }
    }

    #[test]
    fn test_module_stats() {
        let (_dir, storage) = storage();
        for week in [3, 1, 3] {
            storage
                .put_lecture(&Lecture::new("COMP3001", week, format!("Week {week}"), "f.pdf"))
                .unwrap();
        }

        let stats = module_stats(&storage, "comp3001").unwrap();
        assert_eq!(stats.module_code, "COMP3001");
        assert_eq!(stats.total_lectures, 3);
        assert_eq!(stats.total_topics, 0);
        assert_eq!(stats.weeks_covered, vec![1, 3]);
        assert_eq!(stats.lectures[0].week_number, 1);
    }

    #[test]
    fn test_module_stats_unknown_module() {
        let (_dir, storage) = storage();
        assert!(matches!(
            module_stats(&storage, "NOPE1000"),
            Err(TopicsError::NotFound(_))
        ));
    }
}
