//! Topic detection: cluster, label, track appearances, replace.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use lecture_generation::TextGenerator;
use lecture_storage::Storage;
use lecture_types::{
    normalize_module_code, GenerationSettings, LectureChunk, Topic, TopicWithAppearances,
    TopicsSettings,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::appearances::track_appearances;
use crate::clustering::{build_clusterer, group_by_label, Clusterer, NOISE};
use crate::error::TopicsError;
use crate::labeling::{sample_chunks, TopicLabeler};
use crate::map::TopicMap;

/// Discovers and manages the topics of each module.
///
/// Detections for the same module run one at a time in arrival order;
/// different modules proceed concurrently.
pub struct TopicDetector {
    storage: Arc<Storage>,
    clusterer: Arc<dyn Clusterer>,
    labeler: TopicLabeler,
    settings: TopicsSettings,
    module_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TopicDetector {
    pub fn new(
        storage: Arc<Storage>,
        generator: Arc<dyn TextGenerator>,
        settings: TopicsSettings,
        generation: &GenerationSettings,
    ) -> Self {
        Self {
            storage,
            clusterer: build_clusterer(&settings),
            labeler: TopicLabeler::new(generator, &settings, generation),
            settings,
            module_locks: DashMap::new(),
        }
    }

    fn module_code(module_code: &str) -> Result<String, TopicsError> {
        let module = normalize_module_code(module_code);
        if module.is_empty() {
            return Err(TopicsError::InvalidInput(
                "module code must not be empty".to_string(),
            ));
        }
        Ok(module)
    }

    fn module_lock(&self, module: &str) -> Arc<Mutex<()>> {
        self.module_locks
            .entry(module.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Detect the module's topics and replace the stored set with them.
    ///
    /// Fails with NotFound when the module has no lectures and with
    /// InsufficientData when it has fewer embedded chunks than
    /// `min_cluster_size`; nothing is written in either case.
    #[instrument(skip(self))]
    pub async fn detect(&self, module_code: &str) -> Result<Vec<TopicWithAppearances>, TopicsError> {
        let module = Self::module_code(module_code)?;
        let lock = self.module_lock(&module);
        let _guard = lock.lock().await;
        let start = Instant::now();

        if self.storage.list_lectures(&module)?.is_empty() {
            return Err(TopicsError::NotFound(format!(
                "No lectures found for module {module}"
            )));
        }

        let chunks = self.storage.module_chunks(&module)?;
        if chunks.len() < self.settings.min_cluster_size {
            return Err(TopicsError::InsufficientData {
                found: chunks.len(),
                required: self.settings.min_cluster_size,
            });
        }

        let (chunks, data): (Vec<&LectureChunk>, Vec<Vec<f32>>) = chunks
            .iter()
            .filter_map(|item| item.embedding().map(|e| (item, e.to_vec())))
            .unzip();
        info!(
            module = %module,
            chunks = chunks.len(),
            method = self.clusterer.name(),
            "Clustering chunks"
        );

        let clusterer = Arc::clone(&self.clusterer);
        let labels = tokio::task::spawn_blocking(move || clusterer.cluster(&data))
            .await
            .map_err(|e| TopicsError::Clustering(e.to_string()))??;
        if labels.len() != chunks.len() {
            return Err(TopicsError::Clustering(format!(
                "expected {} labels, got {}",
                chunks.len(),
                labels.len()
            )));
        }

        let groups = group_by_label(&labels, self.settings.min_cluster_size);
        debug!(
            clusters = groups.len(),
            noise = labels.iter().filter(|&&l| l == NOISE).count(),
            "Grouped chunks"
        );

        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let clusters: Vec<(i32, Vec<&LectureChunk>)> = groups
            .into_iter()
            .map(|(label, members)| (label, members.into_iter().map(|i| chunks[i]).collect()))
            .collect();
        let samples: Vec<Vec<&LectureChunk>> = clusters
            .iter()
            .map(|(_, members)| sample_chunks(members, self.settings.label_sample_size, &mut rng))
            .collect();

        let labels = join_all(
            clusters
                .iter()
                .zip(&samples)
                .map(|((cluster_id, _), sample)| self.labeler.label(*cluster_id, sample)),
        )
        .await;

        let topics: Vec<TopicWithAppearances> = clusters
            .iter()
            .zip(labels)
            .map(|((_, members), label)| TopicWithAppearances {
                topic: Topic::new(&module, label.name, label.description),
                appearances: track_appearances(members),
            })
            .collect();

        let removed = self.storage.replace_topics(&module, &topics)?;
        info!(
            module = %module,
            detected = topics.len(),
            removed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Topic detection complete"
        );
        Ok(topics)
    }

    /// Stored topics of a module with their appearances.
    pub fn list_topics(&self, module_code: &str) -> Result<Vec<TopicWithAppearances>, TopicsError> {
        let module = Self::module_code(module_code)?;
        Ok(self.storage.list_topics(&module)?)
    }

    pub fn get_topic(
        &self,
        module_code: &str,
        topic_id: &str,
    ) -> Result<TopicWithAppearances, TopicsError> {
        let module = Self::module_code(module_code)?;
        self.storage
            .get_topic_with_appearances(&module, topic_id)?
            .ok_or_else(|| TopicsError::NotFound(format!("topic {topic_id} in module {module}")))
    }

    /// Delete one topic and its appearances.
    #[instrument(skip(self))]
    pub fn delete_topic(&self, module_code: &str, topic_id: &str) -> Result<(), TopicsError> {
        let module = Self::module_code(module_code)?;
        if self.storage.delete_topic(&module, topic_id)? {
            info!(module = %module, topic_id, "Deleted topic");
            Ok(())
        } else {
            Err(TopicsError::NotFound(format!(
                "topic {topic_id} in module {module}"
            )))
        }
    }

    /// Nodes and prerequisite edges for the module's stored topics.
    pub fn topic_map(&self, module_code: &str) -> Result<TopicMap, TopicsError> {
        Ok(TopicMap::build(&self.list_topics(module_code)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lecture_generation::MockGenerator;
    use lecture_types::{Chunk, ClusteringMethod, Lecture};
    use std::collections::HashSet;
    use tempfile::TempDir;

    const DIM: usize = 3;

    fn kmeans_settings() -> TopicsSettings {
        TopicsSettings {
            clustering_method: ClusteringMethod::KMeans,
            ..TopicsSettings::default()
        }
    }

    fn detector(
        storage: Arc<Storage>,
        generator: Arc<MockGenerator>,
        settings: TopicsSettings,
    ) -> TopicDetector {
        TopicDetector::new(storage, generator, settings, &GenerationSettings::default())
    }

    /// Two lectures with three identical-vector chunks each.
    fn seeded_storage() -> (TempDir, Arc<Storage>, Lecture, Lecture) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path(), DIM).unwrap());
        let week1 = Lecture::new("COMP3001", 1, "Arrays", "w1.pdf");
        let week2 = Lecture::new("COMP3001", 2, "Sorting", "w2.pdf");
        storage.put_lecture(&week1).unwrap();
        storage.put_lecture(&week2).unwrap();

        let mut chunks = Vec::new();
        for lecture in [&week1, &week2] {
            for slide in [4, 2, 6] {
                chunks.push(
                    Chunk::new(lecture, format!("{} slide {}", lecture.title, slide), slide)
                        .with_embedding(vec![0.6, 0.8, 0.0]),
                );
            }
        }
        storage.put_chunks(&chunks).unwrap();
        (dir, storage, week1, week2)
    }

    #[tokio::test]
    async fn test_detect_single_cluster() {
        let (_dir, storage, week1, week2) = seeded_storage();
        let generator = Arc::new(MockGenerator::with_response(
            "TOPIC: Array Algorithms\nDESCRIPTION: Working with arrays.",
        ));
        let detector = detector(storage.clone(), generator.clone(), kmeans_settings());

        let topics = detector.detect("comp3001").await.unwrap();
        assert_eq!(topics.len(), 1);
        let topic = &topics[0];
        assert_eq!(topic.topic.name, "Array Algorithms");
        assert_eq!(topic.topic.module_code, "COMP3001");
        assert_eq!(topic.appearances.len(), 2);
        assert_eq!(topic.appearances[0].lecture_id, week1.lecture_id);
        assert_eq!(topic.appearances[0].frequency, 3);
        assert_eq!(topic.appearances[0].first_slide, 2);
        assert_eq!(topic.appearances[1].lecture_id, week2.lecture_id);
        assert_eq!(topic.appearances[1].frequency, 3);

        assert_eq!(generator.call_count(), 1);
        assert_eq!(detector.list_topics("COMP3001").unwrap(), topics);
    }

    #[tokio::test]
    async fn test_detect_replaces_previous_topics() {
        let (_dir, storage, _, _) = seeded_storage();
        let detector = detector(
            storage.clone(),
            Arc::new(MockGenerator::with_response("TOPIC: Arrays")),
            kmeans_settings(),
        );

        let first = detector.detect("COMP3001").await.unwrap();
        let second = detector.detect("COMP3001").await.unwrap();

        let first_ids: HashSet<_> = first.iter().map(|t| t.topic.topic_id.clone()).collect();
        let stored = detector.list_topics("COMP3001").unwrap();
        assert_eq!(stored.len(), second.len());
        assert!(stored.iter().all(|t| !first_ids.contains(&t.topic.topic_id)));
        assert_eq!(storage.get_stats().unwrap().appearance_count, 2);
    }

    #[tokio::test]
    async fn test_detect_label_failure_uses_fallback() {
        let (_dir, storage, _, _) = seeded_storage();
        let detector = detector(storage, Arc::new(MockGenerator::failing()), kmeans_settings());

        let topics = detector.detect("COMP3001").await.unwrap();
        assert_eq!(topics[0].topic.name, "Topic 0");
        assert_eq!(topics[0].topic.description, "Auto-generated topic");
    }

    #[tokio::test]
    async fn test_detect_unknown_module() {
        let (_dir, storage, _, _) = seeded_storage();
        let detector = detector(
            storage,
            Arc::new(MockGenerator::with_response("unused")),
            kmeans_settings(),
        );
        assert!(matches!(
            detector.detect("MATH1001").await,
            Err(TopicsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_detect_insufficient_data_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path(), DIM).unwrap());
        let lecture = Lecture::new("COMP3001", 1, "Intro", "w1.pdf");
        storage.put_lecture(&lecture).unwrap();
        storage
            .put_chunks(&[
                Chunk::new(&lecture, "one", 1).with_embedding(vec![1.0, 0.0, 0.0]),
                Chunk::new(&lecture, "two", 2).with_embedding(vec![0.0, 1.0, 0.0]),
                Chunk::new(&lecture, "not embedded", 3),
            ])
            .unwrap();

        let previous = TopicWithAppearances {
            topic: Topic::new("COMP3001", "Earlier", ""),
            appearances: vec![],
        };
        storage.replace_topics("COMP3001", &[previous.clone()]).unwrap();

        let generator = Arc::new(MockGenerator::with_response("unused"));
        let detector = detector(storage.clone(), generator.clone(), kmeans_settings());
        match detector.detect("COMP3001").await {
            Err(TopicsError::InsufficientData { found, required }) => {
                assert_eq!(found, 2);
                assert_eq!(required, 3);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }

        let stored = storage.list_topics("COMP3001").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].topic.topic_id, previous.topic.topic_id);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_all_noise_clears_topics() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path(), DIM).unwrap());
        let lecture = Lecture::new("COMP3001", 1, "Intro", "w1.pdf");
        storage.put_lecture(&lecture).unwrap();
        // Three mutually distant points with k = 3 give three singleton clusters
        storage
            .put_chunks(&[
                Chunk::new(&lecture, "one", 1).with_embedding(vec![1.0, 0.0, 0.0]),
                Chunk::new(&lecture, "two", 2).with_embedding(vec![0.0, 1.0, 0.0]),
                Chunk::new(&lecture, "three", 3).with_embedding(vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();
        storage
            .replace_topics(
                "COMP3001",
                &[TopicWithAppearances {
                    topic: Topic::new("COMP3001", "Stale", ""),
                    appearances: vec![],
                }],
            )
            .unwrap();

        let detector = detector(
            storage.clone(),
            Arc::new(MockGenerator::with_response("TOPIC: x")),
            kmeans_settings(),
        );
        let topics = detector.detect("COMP3001").await.unwrap();
        assert!(topics.is_empty());
        assert!(storage.list_topics("COMP3001").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hdbscan_detects_two_separated_groups() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path(), DIM).unwrap());
        let week1 = Lecture::new("COMP3001", 1, "Graphs", "w1.pdf");
        let week2 = Lecture::new("COMP3001", 2, "Hashing", "w2.pdf");
        storage.put_lecture(&week1).unwrap();
        storage.put_lecture(&week2).unwrap();

        // Blob near the origin spans both weeks; blob near (10, 10) is week 2 only
        let mut chunks = Vec::new();
        for i in 0..6u32 {
            let jitter = i as f32 * 0.01;
            let lecture = if i < 3 { &week1 } else { &week2 };
            chunks.push(
                Chunk::new(lecture, format!("graph {i}"), i + 1)
                    .with_embedding(vec![jitter, -jitter, 0.0]),
            );
            chunks.push(
                Chunk::new(&week2, format!("hash {i}"), i + 10)
                    .with_embedding(vec![10.0 + jitter, 10.0 - jitter, 0.0]),
            );
        }
        storage.put_chunks(&chunks).unwrap();

        let detector = detector(
            storage.clone(),
            Arc::new(MockGenerator::with_response("TOPIC: Data Structures")),
            TopicsSettings::default(),
        );
        let mut topics = detector.detect("COMP3001").await.unwrap();
        assert_eq!(topics.len(), 2);

        topics.sort_by_key(|t| std::cmp::Reverse(t.appearances.len()));
        let graph = &topics[0];
        assert_eq!(graph.appearances.len(), 2);
        assert_eq!(graph.appearances[0].lecture_id, week1.lecture_id);
        assert_eq!(graph.appearances[0].frequency, 3);
        assert_eq!(graph.appearances[0].first_slide, 1);
        assert_eq!(graph.appearances[1].lecture_id, week2.lecture_id);
        assert_eq!(graph.appearances[1].frequency, 3);
        assert_eq!(graph.appearances[1].first_slide, 4);

        let hash = &topics[1];
        assert_eq!(hash.appearances.len(), 1);
        assert_eq!(hash.appearances[0].lecture_id, week2.lecture_id);
        assert_eq!(hash.appearances[0].frequency, 6);
        assert_eq!(hash.appearances[0].first_slide, 10);

        assert_eq!(storage.list_topics("COMP3001").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hdbscan_single_dense_group_is_noise() {
        let (_dir, storage, _, _) = seeded_storage();
        storage
            .replace_topics(
                "COMP3001",
                &[TopicWithAppearances {
                    topic: Topic::new("COMP3001", "Stale", ""),
                    appearances: vec![],
                }],
            )
            .unwrap();

        let generator = Arc::new(MockGenerator::with_response("TOPIC: unused"));
        let detector = detector(storage.clone(), generator.clone(), TopicsSettings::default());

        let topics = detector.detect("COMP3001").await.unwrap();
        assert!(topics.is_empty());
        assert!(storage.list_topics("COMP3001").unwrap().is_empty());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_detects_on_one_module_serialize() {
        let (_dir, storage, _, _) = seeded_storage();
        let detector = Arc::new(detector(
            storage.clone(),
            Arc::new(MockGenerator::with_response("TOPIC: Arrays")),
            kmeans_settings(),
        ));

        let a = tokio::spawn({
            let detector = Arc::clone(&detector);
            async move { detector.detect("COMP3001").await }
        });
        let b = tokio::spawn({
            let detector = Arc::clone(&detector);
            async move { detector.detect("comp3001").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Whichever ran last left exactly one topic set behind
        assert_eq!(storage.list_topics("COMP3001").unwrap().len(), 1);
        assert_eq!(storage.get_stats().unwrap().appearance_count, 2);
    }

    #[tokio::test]
    async fn test_delete_topic_and_map() {
        let (_dir, storage, _, _) = seeded_storage();
        let detector = detector(
            storage,
            Arc::new(MockGenerator::with_response("TOPIC: Arrays")),
            kmeans_settings(),
        );
        let topics = detector.detect("COMP3001").await.unwrap();
        let id = topics[0].topic.topic_id.clone();

        let map = detector.topic_map("COMP3001").unwrap();
        assert_eq!(map.nodes.len(), 1);
        assert_eq!(map.nodes[0].size, 4);
        assert!(map.edges.is_empty());

        assert_eq!(detector.get_topic("COMP3001", &id).unwrap().topic.name, "Arrays");
        detector.delete_topic("COMP3001", &id).unwrap();
        assert!(matches!(
            detector.delete_topic("COMP3001", &id),
            Err(TopicsError::NotFound(_))
        ));
        assert!(matches!(
            detector.get_topic("COMP3001", &id),
            Err(TopicsError::NotFound(_))
        ));
        assert!(detector.topic_map("COMP3001").unwrap().is_empty());
    }
}
