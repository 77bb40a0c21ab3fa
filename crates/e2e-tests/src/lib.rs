//! End-to-end test infrastructure for the lecture assistant.
//!
//! Provides a shared TestHarness over a temporary RocksDB store plus
//! helpers that seed lectures and embedded chunks and wire the engines to
//! deterministic mock gateways.

use std::sync::Arc;

use lecture_embeddings::MockEmbedder;
use lecture_generation::MockGenerator;
use lecture_retrieval::RetrievalEngine;
use lecture_storage::Storage;
use lecture_topics::TopicDetector;
use lecture_types::{
    Chunk, ClusteringMethod, GenerationSettings, Lecture, RetrievalSettings, TopicsSettings,
};

/// Embedding dimension used by every E2E store.
pub const DIM: usize = 3;

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance
    pub storage: Arc<Storage>,
}

impl TestHarness {
    /// Create a new test harness with temp directory and storage.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(
            Storage::open(temp_dir.path(), DIM).expect("Failed to open test storage"),
        );
        Self {
            _temp_dir: temp_dir,
            storage,
        }
    }

    /// Store a lecture and return it.
    pub fn add_lecture(&self, module: &str, week: u32, title: &str) -> Lecture {
        let lecture = Lecture::new(module, week, title, format!("{}.pdf", title.to_lowercase()));
        self.storage
            .put_lecture(&lecture)
            .expect("Failed to put lecture");
        lecture
    }

    /// Store embedded chunks `(slide, content, embedding)` for a lecture.
    pub fn add_chunks(&self, lecture: &Lecture, chunks: &[(u32, &str, [f32; DIM])]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = chunks
            .iter()
            .map(|(slide, content, embedding)| {
                Chunk::new(lecture, *content, *slide).with_embedding(embedding.to_vec())
            })
            .collect();
        self.storage
            .put_chunks(&chunks)
            .expect("Failed to put chunks");
        chunks
    }

    /// Retrieval engine over this store.
    pub fn retrieval(
        &self,
        embedder: Arc<MockEmbedder>,
        generator: Arc<MockGenerator>,
    ) -> RetrievalEngine {
        RetrievalEngine::new(
            self.storage.clone(),
            embedder,
            generator,
            RetrievalSettings::default(),
            &test_generation_settings(),
        )
    }

    /// Topic detector over this store.
    pub fn detector(&self, generator: Arc<MockGenerator>, settings: TopicsSettings) -> TopicDetector {
        TopicDetector::new(
            self.storage.clone(),
            generator,
            settings,
            &test_generation_settings(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Generation settings with a short timeout.
pub fn test_generation_settings() -> GenerationSettings {
    GenerationSettings {
        timeout_secs: 2,
        ..GenerationSettings::default()
    }
}

/// Seeded k-means detection with the default minimum cluster size.
pub fn kmeans_settings() -> TopicsSettings {
    TopicsSettings {
        clustering_method: ClusteringMethod::KMeans,
        ..TopicsSettings::default()
    }
}

/// Seed COMP3001 with two lectures (weeks 1 and 2) of three chunks each,
/// all sharing one embedding so they form a single cluster.
pub fn seed_comp3001(harness: &TestHarness) -> (Lecture, Lecture) {
    let week1 = harness.add_lecture("COMP3001", 1, "Algorithm Analysis");
    let week2 = harness.add_lecture("COMP3001", 2, "Sorting Algorithms");
    let shared = [0.6, 0.8, 0.0];

    harness.add_chunks(
        &week1,
        &[
            (2, "Big-O describes the growth of running time.", shared),
            (5, "Worst-case analysis bounds every input.", shared),
            (8, "Amortised cost spreads work over operations.", shared),
        ],
    );
    harness.add_chunks(
        &week2,
        &[
            (3, "Merge sort runs in O(n log n).", shared),
            (4, "Insertion sort is quadratic in the worst case.", shared),
            (9, "Counting sort beats comparison bounds.", shared),
        ],
    );
    (week1, week2)
}
