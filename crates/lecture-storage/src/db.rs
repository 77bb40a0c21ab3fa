//! RocksDB wrapper for the lecture chunk store.
//!
//! Provides:
//! - Database open with column family setup and a fixed embedding dimension
//! - Lecture and chunk writes (chunks dimension-checked at insert)
//! - Exact cosine-similarity ranking over a module's embedded chunks
//! - Atomic replacement of a module's topics and appearances
//! - Cascading deletes for lectures and topics

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, instrument};

use lecture_types::similarity::cosine_similarity;
use lecture_types::{
    normalize_module_code, AppearanceDetail, Chunk, Lecture, LectureChunk, ScoredChunk, Topic,
    TopicAppearance, TopicWithAppearances,
};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_APPEARANCES, CF_CHUNKS, CF_LECTURES, CF_META,
    CF_TOPICS,
};
use crate::error::StorageError;
use crate::keys::{validate_segment, AppearanceKey, ChunkKey, LectureKey, TopicKey};

const META_EMBEDDING_DIMENSION: &[u8] = b"embedding_dimension";

/// Main storage interface for the lecture assistant
pub struct Storage {
    db: DB,
    embedding_dimension: usize,
}

impl Storage {
    /// Open storage at the given path, creating if necessary.
    ///
    /// The embedding dimension is recorded on first open. Reopening with a
    /// different dimension fails with [`StorageError::DimensionMismatch`].
    pub fn open(path: &Path, embedding_dimension: usize) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        if embedding_dimension == 0 {
            return Err(StorageError::InvalidInput(
                "embedding dimension must be > 0".to_string(),
            ));
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Self::check_embedding_dimension(&db, embedding_dimension)?;

        Ok(Self {
            db,
            embedding_dimension,
        })
    }

    /// Compare the requested dimension with the one stored on first open.
    fn check_embedding_dimension(db: &DB, expected: usize) -> Result<(), StorageError> {
        let cf = db
            .cf_handle(CF_META)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_META.to_string()))?;

        match db.get_cf(cf, META_EMBEDDING_DIMENSION)? {
            Some(bytes) => {
                let stored: usize = std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        StorageError::Serialization("invalid stored embedding dimension".into())
                    })?;
                if stored != expected {
                    return Err(StorageError::DimensionMismatch {
                        expected: stored,
                        actual: expected,
                    });
                }
            }
            None => {
                db.put_cf(cf, META_EMBEDDING_DIMENSION, expected.to_string().as_bytes())?;
            }
        }
        Ok(())
    }

    /// Dimension every stored embedding has.
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Normalize and validate a caller-supplied module code.
    fn module_key(module_code: &str) -> Result<String, StorageError> {
        let module = normalize_module_code(module_code);
        validate_segment("module code", &module)?;
        Ok(module)
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<(), StorageError> {
        if embedding.len() != self.embedding_dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.embedding_dimension,
                actual: embedding.len(),
            });
        }
        // NaN and infinity serialize as JSON null and could not be read back
        if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(StorageError::InvalidInput(format!(
                "embedding component {pos} is not finite"
            )));
        }
        Ok(())
    }

    /// Collect entries whose key starts with `prefix`.
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    // ===== Lectures =====

    /// Store a new lecture. Lectures are immutable; rewriting one fails.
    #[instrument(skip(self, lecture), fields(lecture_id = %lecture.lecture_id))]
    pub fn put_lecture(&self, lecture: &Lecture) -> Result<(), StorageError> {
        let module = Self::module_key(&lecture.module_code)?;
        if module != lecture.module_code {
            return Err(StorageError::InvalidInput(format!(
                "module code must be stored uppercase: {}",
                lecture.module_code
            )));
        }
        validate_segment("lecture id", &lecture.lecture_id)?;
        if lecture.week_number == 0 {
            return Err(StorageError::InvalidInput(
                "week_number must be >= 1".to_string(),
            ));
        }

        let cf = self.cf(CF_LECTURES)?;
        let key = LectureKey::new(&module, &lecture.lecture_id).to_bytes();
        if self.db.get_cf(cf, &key)?.is_some() {
            return Err(StorageError::InvalidInput(format!(
                "lecture {} already exists",
                lecture.lecture_id
            )));
        }

        self.db.put_cf(cf, key, lecture.to_bytes()?)?;
        debug!(module = %module, week = lecture.week_number, "Stored lecture");
        Ok(())
    }

    /// Get a lecture by module and ID.
    pub fn get_lecture(
        &self,
        module_code: &str,
        lecture_id: &str,
    ) -> Result<Option<Lecture>, StorageError> {
        let module = Self::module_key(module_code)?;
        let cf = self.cf(CF_LECTURES)?;
        match self
            .db
            .get_cf(cf, LectureKey::new(&module, lecture_id).to_bytes())?
        {
            Some(bytes) => Ok(Some(Lecture::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All lectures of a module, ordered by week then title.
    pub fn list_lectures(&self, module_code: &str) -> Result<Vec<Lecture>, StorageError> {
        let module = Self::module_key(module_code)?;
        let mut lectures = self
            .scan_prefix(CF_LECTURES, &LectureKey::module_prefix(&module))?
            .into_iter()
            .map(|(_, value)| Lecture::from_bytes(&value).map_err(StorageError::from))
            .collect::<Result<Vec<_>, _>>()?;

        lectures.sort_by(|a, b| {
            a.week_number
                .cmp(&b.week_number)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.lecture_id.cmp(&b.lecture_id))
        });
        Ok(lectures)
    }

    /// Distinct module codes with at least one lecture, sorted.
    pub fn list_modules(&self) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_LECTURES)?;
        let mut modules = BTreeSet::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            modules.insert(LectureKey::from_bytes(&key)?.module_code);
        }
        Ok(modules.into_iter().collect())
    }

    fn lecture_map(&self, module: &str) -> Result<HashMap<String, Lecture>, StorageError> {
        Ok(self
            .list_lectures(module)?
            .into_iter()
            .map(|l| (l.lecture_id.clone(), l))
            .collect())
    }

    /// Delete a lecture with its chunks and every topic appearance that
    /// references it. Returns false if the lecture does not exist.
    #[instrument(skip(self))]
    pub fn delete_lecture(&self, module_code: &str, lecture_id: &str) -> Result<bool, StorageError> {
        let module = Self::module_key(module_code)?;
        let lectures_cf = self.cf(CF_LECTURES)?;
        let chunks_cf = self.cf(CF_CHUNKS)?;
        let appearances_cf = self.cf(CF_APPEARANCES)?;

        let lecture_key = LectureKey::new(&module, lecture_id).to_bytes();
        if self.db.get_cf(lectures_cf, &lecture_key)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(lectures_cf, &lecture_key);

        let chunk_entries =
            self.scan_prefix(CF_CHUNKS, &ChunkKey::lecture_prefix(&module, lecture_id))?;
        for (key, _) in &chunk_entries {
            batch.delete_cf(chunks_cf, key);
        }

        let mut removed_appearances = 0usize;
        for (key, _) in self.scan_prefix(CF_APPEARANCES, &AppearanceKey::module_prefix(&module))? {
            if AppearanceKey::from_bytes(&key)?.lecture_id == lecture_id {
                batch.delete_cf(appearances_cf, &key);
                removed_appearances += 1;
            }
        }

        self.db.write(batch)?;
        info!(
            module = %module,
            chunks = chunk_entries.len(),
            appearances = removed_appearances,
            "Deleted lecture"
        );
        Ok(true)
    }

    // ===== Chunks =====

    /// Insert chunks in one batch.
    ///
    /// Every chunk must belong to an existing lecture of its module, have a
    /// 1-based slide number, and, if embedded, match the store dimension.
    /// Nothing is written if any chunk is rejected.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub fn put_chunks(&self, chunks: &[Chunk]) -> Result<usize, StorageError> {
        let cf = self.cf(CF_CHUNKS)?;
        let mut known_lectures: HashSet<(String, String)> = HashSet::new();
        let mut batch = WriteBatch::default();

        for chunk in chunks {
            validate_segment("chunk id", &chunk.chunk_id)?;
            if chunk.slide_number == 0 {
                return Err(StorageError::InvalidInput(format!(
                    "chunk {} has slide_number 0; slides are 1-based",
                    chunk.chunk_id
                )));
            }
            if let Some(embedding) = &chunk.embedding {
                self.check_embedding(embedding)?;
            }

            let module = Self::module_key(&chunk.module_code)?;
            if module != chunk.module_code {
                return Err(StorageError::InvalidInput(format!(
                    "module code must be stored uppercase: {}",
                    chunk.module_code
                )));
            }
            let owner = (module.clone(), chunk.lecture_id.clone());
            if !known_lectures.contains(&owner) {
                if self.get_lecture(&module, &chunk.lecture_id)?.is_none() {
                    return Err(StorageError::NotFound(format!(
                        "lecture {} in module {}",
                        chunk.lecture_id, chunk.module_code
                    )));
                }
                known_lectures.insert(owner);
            }

            let key = ChunkKey::new(&module, &chunk.lecture_id, &chunk.chunk_id);
            batch.put_cf(cf, key.to_bytes(), chunk.to_bytes()?);
        }

        self.db.write(batch)?;
        debug!(count = chunks.len(), "Stored chunks");
        Ok(chunks.len())
    }

    /// Store embeddings for chunks that do not have one yet.
    ///
    /// Each input chunk identifies the stored record and carries the new
    /// embedding; the stored content is left untouched. Chunks that already
    /// have an embedding are rejected.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub fn attach_embeddings(&self, chunks: &[Chunk]) -> Result<usize, StorageError> {
        let cf = self.cf(CF_CHUNKS)?;
        let mut batch = WriteBatch::default();

        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().ok_or_else(|| {
                StorageError::InvalidInput(format!("chunk {} has no embedding", chunk.chunk_id))
            })?;
            self.check_embedding(embedding)?;

            let module = Self::module_key(&chunk.module_code)?;
            let key = ChunkKey::new(&module, &chunk.lecture_id, &chunk.chunk_id).to_bytes();
            let stored = self
                .db
                .get_cf(cf, &key)?
                .ok_or_else(|| StorageError::NotFound(format!("chunk {}", chunk.chunk_id)))?;
            let stored = Chunk::from_bytes(&stored)?;
            if stored.is_embedded() {
                return Err(StorageError::InvalidInput(format!(
                    "chunk {} already has an embedding",
                    chunk.chunk_id
                )));
            }

            batch.put_cf(cf, key, stored.with_embedding(embedding.clone()).to_bytes()?);
        }

        self.db.write(batch)?;
        debug!(count = chunks.len(), "Attached embeddings");
        Ok(chunks.len())
    }

    /// Chunks of a module that still need an embedding.
    pub fn chunks_missing_embeddings(&self, module_code: &str) -> Result<Vec<Chunk>, StorageError> {
        let module = Self::module_key(module_code)?;
        let mut missing = Vec::new();
        for (_, value) in self.scan_prefix(CF_CHUNKS, &ChunkKey::module_prefix(&module))? {
            let chunk = Chunk::from_bytes(&value)?;
            if !chunk.is_embedded() {
                missing.push(chunk);
            }
        }
        Ok(missing)
    }

    /// Load a module's chunks joined with lecture metadata, keeping those
    /// accepted by `keep`.
    fn load_module_chunks<F>(&self, module: &str, keep: F) -> Result<Vec<LectureChunk>, StorageError>
    where
        F: Fn(&Chunk, &Lecture) -> bool,
    {
        let lectures = self.lecture_map(module)?;
        let mut chunks = Vec::new();

        for (_, value) in self.scan_prefix(CF_CHUNKS, &ChunkKey::module_prefix(module))? {
            let chunk = Chunk::from_bytes(&value)?;
            let Some(lecture) = lectures.get(&chunk.lecture_id) else {
                continue;
            };
            if keep(&chunk, lecture) {
                chunks.push(LectureChunk {
                    lecture_title: lecture.title.clone(),
                    week_number: lecture.week_number,
                    chunk,
                });
            }
        }

        chunks.sort_by(|a, b| {
            a.week_number
                .cmp(&b.week_number)
                .then_with(|| a.chunk.lecture_id.cmp(&b.chunk.lecture_id))
                .then_with(|| a.chunk.slide_number.cmp(&b.chunk.slide_number))
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        Ok(chunks)
    }

    /// Every embedded chunk of a module with its lecture metadata, ordered by
    /// week, lecture and slide.
    #[instrument(skip(self))]
    pub fn module_chunks(&self, module_code: &str) -> Result<Vec<LectureChunk>, StorageError> {
        let module = Self::module_key(module_code)?;
        let chunks = self.load_module_chunks(&module, |chunk, _| chunk.is_embedded())?;
        debug!(count = chunks.len(), "Loaded embedded chunks");
        Ok(chunks)
    }

    /// Chunks belonging to the given lectures, ordered by week then slide,
    /// at most `limit` of them. Embeddings are not required.
    pub fn lecture_chunks(
        &self,
        module_code: &str,
        lecture_ids: &[String],
        limit: usize,
    ) -> Result<Vec<LectureChunk>, StorageError> {
        let module = Self::module_key(module_code)?;
        let wanted: HashSet<&str> = lecture_ids.iter().map(String::as_str).collect();
        let mut chunks =
            self.load_module_chunks(&module, |chunk, _| wanted.contains(chunk.lecture_id.as_str()))?;

        chunks.sort_by(|a, b| {
            a.week_number
                .cmp(&b.week_number)
                .then_with(|| a.chunk.slide_number.cmp(&b.chunk.slide_number))
                .then_with(|| a.chunk.lecture_id.cmp(&b.chunk.lecture_id))
        });
        chunks.truncate(limit);
        Ok(chunks)
    }

    /// Rank a module's embedded chunks by cosine similarity to `query`.
    ///
    /// With `max_week` set, chunks from later weeks are excluded before
    /// ranking. Results are ordered by similarity descending (ties by chunk
    /// ID) and cut to `top_k`.
    #[instrument(skip(self, query))]
    pub fn search_similar(
        &self,
        module_code: &str,
        query: &[f32],
        max_week: Option<u32>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StorageError> {
        let module = Self::module_key(module_code)?;
        self.check_embedding(query)?;

        let candidates = self.load_module_chunks(&module, |chunk, lecture| {
            chunk.is_embedded() && max_week.map_or(true, |w| lecture.week_number <= w)
        })?;
        let candidate_count = candidates.len();

        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|item| {
                let similarity = item
                    .embedding()
                    .map(|e| cosine_similarity(query, e))
                    .unwrap_or(0.0);
                ScoredChunk { item, similarity }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.item.chunk.chunk_id.cmp(&b.item.chunk.chunk_id))
        });
        scored.truncate(top_k);

        debug!(
            candidates = candidate_count,
            returned = scored.len(),
            "Similarity search complete"
        );
        Ok(scored)
    }

    // ===== Topics =====

    /// Replace all topics and appearances of a module in one atomic write.
    ///
    /// Every appearance must reference an existing lecture of the module.
    /// On any error nothing is written and the previous topics remain.
    /// Returns the number of topics removed.
    #[instrument(skip(self, topics), fields(count = topics.len()))]
    pub fn replace_topics(
        &self,
        module_code: &str,
        topics: &[TopicWithAppearances],
    ) -> Result<usize, StorageError> {
        let module = Self::module_key(module_code)?;
        let topics_cf = self.cf(CF_TOPICS)?;
        let appearances_cf = self.cf(CF_APPEARANCES)?;
        let lectures = self.lecture_map(&module)?;

        let mut batch = WriteBatch::default();

        let existing_topics = self.scan_prefix(CF_TOPICS, &TopicKey::module_prefix(&module))?;
        for (key, _) in &existing_topics {
            batch.delete_cf(topics_cf, key);
        }
        for (key, _) in self.scan_prefix(CF_APPEARANCES, &AppearanceKey::module_prefix(&module))? {
            batch.delete_cf(appearances_cf, key);
        }

        for entry in topics {
            let topic = &entry.topic;
            validate_segment("topic id", &topic.topic_id)?;
            if topic.module_code != module {
                return Err(StorageError::InvalidInput(format!(
                    "topic {} belongs to module {}, not {}",
                    topic.topic_id, topic.module_code, module
                )));
            }
            batch.put_cf(
                topics_cf,
                TopicKey::new(&module, &topic.topic_id).to_bytes(),
                topic.to_bytes()?,
            );

            for appearance in entry.appearance_rows() {
                if !lectures.contains_key(&appearance.lecture_id) {
                    return Err(StorageError::NotFound(format!(
                        "lecture {} in module {}",
                        appearance.lecture_id, module
                    )));
                }
                let key = AppearanceKey::new(&module, &topic.topic_id, &appearance.lecture_id);
                batch.put_cf(appearances_cf, key.to_bytes(), appearance.to_bytes()?);
            }
        }

        self.db.write(batch)?;
        info!(
            module = %module,
            removed = existing_topics.len(),
            inserted = topics.len(),
            "Replaced topics"
        );
        Ok(existing_topics.len())
    }

    /// Get a topic by module and ID.
    pub fn get_topic(&self, module_code: &str, topic_id: &str) -> Result<Option<Topic>, StorageError> {
        let module = Self::module_key(module_code)?;
        let cf = self.cf(CF_TOPICS)?;
        match self.db.get_cf(cf, TopicKey::new(&module, topic_id).to_bytes())? {
            Some(bytes) => Ok(Some(Topic::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Appearances of one topic joined with lecture metadata, ordered by week.
    fn appearance_details(
        &self,
        module: &str,
        topic_id: &str,
        lectures: &HashMap<String, Lecture>,
    ) -> Result<Vec<AppearanceDetail>, StorageError> {
        let mut details = Vec::new();
        for (_, value) in self.scan_prefix(CF_APPEARANCES, &AppearanceKey::topic_prefix(module, topic_id))? {
            let appearance = TopicAppearance::from_bytes(&value)?;
            let Some(lecture) = lectures.get(&appearance.lecture_id) else {
                continue;
            };
            details.push(AppearanceDetail {
                lecture_id: appearance.lecture_id,
                lecture_title: lecture.title.clone(),
                week_number: lecture.week_number,
                frequency: appearance.frequency,
                first_slide: appearance.first_slide,
            });
        }
        details.sort_by(|a, b| {
            a.week_number
                .cmp(&b.week_number)
                .then_with(|| a.lecture_id.cmp(&b.lecture_id))
        });
        Ok(details)
    }

    /// A topic with its appearances.
    pub fn get_topic_with_appearances(
        &self,
        module_code: &str,
        topic_id: &str,
    ) -> Result<Option<TopicWithAppearances>, StorageError> {
        let module = Self::module_key(module_code)?;
        let Some(topic) = self.get_topic(&module, topic_id)? else {
            return Ok(None);
        };
        let lectures = self.lecture_map(&module)?;
        let appearances = self.appearance_details(&module, topic_id, &lectures)?;
        Ok(Some(TopicWithAppearances { topic, appearances }))
    }

    /// All topics of a module with their appearances, oldest first.
    #[instrument(skip(self))]
    pub fn list_topics(&self, module_code: &str) -> Result<Vec<TopicWithAppearances>, StorageError> {
        let module = Self::module_key(module_code)?;
        let lectures = self.lecture_map(&module)?;

        let mut topics = Vec::new();
        for (_, value) in self.scan_prefix(CF_TOPICS, &TopicKey::module_prefix(&module))? {
            let topic = Topic::from_bytes(&value)?;
            let appearances = self.appearance_details(&module, &topic.topic_id, &lectures)?;
            topics.push(TopicWithAppearances { topic, appearances });
        }

        topics.sort_by(|a, b| {
            a.topic
                .created_at
                .cmp(&b.topic.created_at)
                .then_with(|| a.topic.name.cmp(&b.topic.name))
        });
        Ok(topics)
    }

    /// Delete a topic and its appearances. Returns false if it does not exist.
    #[instrument(skip(self))]
    pub fn delete_topic(&self, module_code: &str, topic_id: &str) -> Result<bool, StorageError> {
        let module = Self::module_key(module_code)?;
        let topics_cf = self.cf(CF_TOPICS)?;
        let appearances_cf = self.cf(CF_APPEARANCES)?;

        let topic_key = TopicKey::new(&module, topic_id).to_bytes();
        if self.db.get_cf(topics_cf, &topic_key)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(topics_cf, &topic_key);
        for (key, _) in self.scan_prefix(CF_APPEARANCES, &AppearanceKey::topic_prefix(&module, topic_id))? {
            batch.delete_cf(appearances_cf, key);
        }
        self.db.write(batch)?;
        debug!(module = %module, "Deleted topic");
        Ok(true)
    }

    // ===== Admin Operations =====

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats {
            embedding_dimension: self.embedding_dimension,
            ..StorageStats::default()
        };

        stats.lecture_count = self.count_cf_entries(self.cf(CF_LECTURES)?)?;
        stats.topic_count = self.count_cf_entries(self.cf(CF_TOPICS)?)?;
        stats.appearance_count = self.count_cf_entries(self.cf(CF_APPEARANCES)?)?;

        for item in self.db.iterator_cf(self.cf(CF_CHUNKS)?, IteratorMode::Start) {
            let (_, value) = item?;
            stats.chunk_count += 1;
            if Chunk::from_bytes(&value)?.is_embedded() {
                stats.embedded_chunk_count += 1;
            }
        }

        stats.module_count = self.list_modules()?.len() as u64;
        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Flush all column families to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            self.db.flush_cf(self.cf(cf_name)?)?;
        }
        Ok(())
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub lecture_count: u64,
    pub chunk_count: u64,
    /// Chunks with a computed embedding
    pub embedded_chunk_count: u64,
    pub topic_count: u64,
    pub appearance_count: u64,
    pub module_count: u64,
    pub embedding_dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 3;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path(), DIM).unwrap();
        (storage, temp_dir)
    }

    fn seed_lecture(storage: &Storage, module: &str, week: u32, title: &str) -> Lecture {
        let lecture = Lecture::new(module, week, title, format!("{title}.pdf"));
        storage.put_lecture(&lecture).unwrap();
        lecture
    }

    fn embedded(lecture: &Lecture, slide: u32, embedding: [f32; DIM]) -> Chunk {
        Chunk::new(lecture, format!("{} slide {}", lecture.title, slide), slide)
            .with_embedding(embedding.to_vec())
    }

    fn detected(module: &str, name: &str, lecture: &Lecture) -> TopicWithAppearances {
        TopicWithAppearances {
            topic: Topic::new(module, name, "desc"),
            appearances: vec![AppearanceDetail {
                lecture_id: lecture.lecture_id.clone(),
                lecture_title: lecture.title.clone(),
                week_number: lecture.week_number,
                frequency: 2,
                first_slide: 1,
            }],
        }
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_reopen_with_different_dimension_fails() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = Storage::open(temp_dir.path(), DIM).unwrap();
            assert_eq!(storage.embedding_dimension(), DIM);
        }
        let result = Storage::open(temp_dir.path(), DIM + 1);
        assert!(matches!(
            result,
            Err(StorageError::DimensionMismatch { expected: 3, actual: 4 })
        ));
        assert!(Storage::open(temp_dir.path(), DIM).is_ok());
    }

    #[test]
    fn test_lecture_roundtrip_and_listing() {
        let (storage, _temp) = create_test_storage();
        let w2 = seed_lecture(&storage, "COMP3001", 2, "Sorting");
        let w1 = seed_lecture(&storage, "COMP3001", 1, "Intro");
        seed_lecture(&storage, "MATH1001", 1, "Limits");

        let fetched = storage.get_lecture("comp3001", &w2.lecture_id).unwrap();
        assert_eq!(fetched, Some(w2.clone()));

        let listed = storage.list_lectures("comp3001").unwrap();
        let ids: Vec<_> = listed.iter().map(|l| l.lecture_id.clone()).collect();
        assert_eq!(ids, vec![w1.lecture_id, w2.lecture_id]);

        assert_eq!(storage.list_modules().unwrap(), vec!["COMP3001", "MATH1001"]);
    }

    #[test]
    fn test_duplicate_lecture_rejected() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        assert!(matches!(
            storage.put_lecture(&lecture),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_chunk_dimension_checked_at_insert() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let good = embedded(&lecture, 1, [1.0, 0.0, 0.0]);
        let bad = Chunk::new(&lecture, "wrong", 2).with_embedding(vec![1.0, 0.0]);

        let result = storage.put_chunks(&[good, bad]);
        assert!(matches!(
            result,
            Err(StorageError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        // Nothing from the rejected batch was written
        assert!(storage.module_chunks("COMP3001").unwrap().is_empty());
    }

    #[test]
    fn test_non_finite_embedding_rejected() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let good = embedded(&lecture, 1, [1.0, 0.0, 0.0]);
        let nan = Chunk::new(&lecture, "nan", 2).with_embedding(vec![f32::NAN, 0.0, 0.0]);

        assert!(matches!(
            storage.put_chunks(&[good, nan]),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(storage.module_chunks("COMP3001").unwrap().is_empty());

        storage.put_chunks(&[Chunk::new(&lecture, "pending", 3)]).unwrap();
        let pending = storage.chunks_missing_embeddings("COMP3001").unwrap();
        let infinite = pending[0].clone().with_embedding(vec![0.0, f32::INFINITY, 0.0]);
        assert!(matches!(
            storage.attach_embeddings(&[infinite]),
            Err(StorageError::InvalidInput(_))
        ));
        // The module stays readable
        assert_eq!(storage.chunks_missing_embeddings("COMP3001").unwrap().len(), 1);
    }

    #[test]
    fn test_chunk_requires_existing_lecture() {
        let (storage, _temp) = create_test_storage();
        let orphan_lecture = Lecture::new("COMP3001", 1, "Never stored", "x.pdf");
        let chunk = embedded(&orphan_lecture, 1, [1.0, 0.0, 0.0]);
        assert!(matches!(
            storage.put_chunks(&[chunk]),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_attach_embeddings_backfills_once() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let chunk = Chunk::new(&lecture, "pending", 1);
        storage.put_chunks(&[chunk.clone()]).unwrap();

        let missing = storage.chunks_missing_embeddings("COMP3001").unwrap();
        assert_eq!(missing.len(), 1);
        assert!(storage.module_chunks("COMP3001").unwrap().is_empty());

        let update = missing[0].clone().with_embedding(vec![0.0, 1.0, 0.0]);
        storage.attach_embeddings(&[update.clone()]).unwrap();

        assert!(storage.chunks_missing_embeddings("COMP3001").unwrap().is_empty());
        let stored = storage.module_chunks("COMP3001").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].chunk.content, "pending");

        assert!(matches!(
            storage.attach_embeddings(&[update]),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_search_similar_ranks_and_filters_by_week() {
        let (storage, _temp) = create_test_storage();
        let w1 = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let w3 = seed_lecture(&storage, "COMP3001", 3, "Trees");
        storage
            .put_chunks(&[
                embedded(&w1, 1, [1.0, 0.0, 0.0]),
                embedded(&w1, 2, [0.7, 0.7, 0.0]),
                embedded(&w3, 1, [0.9, 0.1, 0.0]),
                Chunk::new(&w1, "no embedding yet", 3),
            ])
            .unwrap();

        let query = [1.0, 0.0, 0.0];
        let all = storage.search_similar("COMP3001", &query, None, 10).unwrap();
        assert_eq!(all.len(), 3);
        for pair in all.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        assert_eq!(all[0].item.chunk.slide_number, 1);
        assert_eq!(all[0].item.week_number, 1);
        assert_eq!(all[1].item.week_number, 3);

        let filtered = storage.search_similar("COMP3001", &query, Some(2), 10).unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|s| s.item.week_number <= 2));

        let top1 = storage.search_similar("COMP3001", &query, None, 1).unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let (storage, _temp) = create_test_storage();
        assert!(matches!(
            storage.search_similar("COMP3001", &[1.0], None, 5),
            Err(StorageError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_lecture_chunks_ordered_and_capped() {
        let (storage, _temp) = create_test_storage();
        let w2 = seed_lecture(&storage, "COMP3001", 2, "Sorting");
        let w1 = seed_lecture(&storage, "COMP3001", 1, "Intro");
        storage
            .put_chunks(&[
                embedded(&w2, 1, [1.0, 0.0, 0.0]),
                embedded(&w1, 2, [1.0, 0.0, 0.0]),
                embedded(&w1, 1, [1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let ids = vec![w1.lecture_id.clone(), w2.lecture_id.clone()];
        let chunks = storage.lecture_chunks("COMP3001", &ids, 10).unwrap();
        let order: Vec<(u32, u32)> = chunks
            .iter()
            .map(|c| (c.week_number, c.chunk.slide_number))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);

        let capped = storage.lecture_chunks("COMP3001", &ids, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_replace_topics_removes_previous_set() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");

        let first = vec![
            detected("COMP3001", "Recursion", &lecture),
            detected("COMP3001", "Big-O", &lecture),
        ];
        assert_eq!(storage.replace_topics("COMP3001", &first).unwrap(), 0);
        assert_eq!(storage.list_topics("COMP3001").unwrap().len(), 2);

        let second = vec![detected("COMP3001", "Graphs", &lecture)];
        assert_eq!(storage.replace_topics("COMP3001", &second).unwrap(), 2);

        let topics = storage.list_topics("COMP3001").unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic.name, "Graphs");
        assert_eq!(topics[0].appearances.len(), 1);
        assert_eq!(topics[0].appearances[0].frequency, 2);
        for old in &first {
            assert!(storage.get_topic("COMP3001", &old.topic.topic_id).unwrap().is_none());
        }
        assert_eq!(storage.get_stats().unwrap().appearance_count, 1);
    }

    #[test]
    fn test_replace_topics_is_atomic_on_bad_reference() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        storage
            .replace_topics("COMP3001", &[detected("COMP3001", "Keep me", &lecture)])
            .unwrap();

        let ghost = Lecture::new("COMP3001", 2, "Ghost", "ghost.pdf");
        let result = storage.replace_topics("COMP3001", &[detected("COMP3001", "Bad", &ghost)]);
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let topics = storage.list_topics("COMP3001").unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic.name, "Keep me");
    }

    #[test]
    fn test_replace_topics_scoped_to_module() {
        let (storage, _temp) = create_test_storage();
        let comp = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let math = seed_lecture(&storage, "MATH1001", 1, "Limits");
        storage
            .replace_topics("MATH1001", &[detected("MATH1001", "Limits", &math)])
            .unwrap();
        storage
            .replace_topics("COMP3001", &[detected("COMP3001", "Intro", &comp)])
            .unwrap();
        storage.replace_topics("COMP3001", &[]).unwrap();

        assert!(storage.list_topics("COMP3001").unwrap().is_empty());
        assert_eq!(storage.list_topics("MATH1001").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_topic_cascades() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let topic = detected("COMP3001", "Recursion", &lecture);
        storage.replace_topics("COMP3001", &[topic.clone()]).unwrap();

        assert!(storage.delete_topic("COMP3001", &topic.topic.topic_id).unwrap());
        assert!(!storage.delete_topic("COMP3001", &topic.topic.topic_id).unwrap());
        assert_eq!(storage.get_stats().unwrap().appearance_count, 0);
    }

    #[test]
    fn test_delete_lecture_cascades_chunks_and_appearances() {
        let (storage, _temp) = create_test_storage();
        let w1 = seed_lecture(&storage, "COMP3001", 1, "Intro");
        let w2 = seed_lecture(&storage, "COMP3001", 2, "Sorting");
        storage
            .put_chunks(&[embedded(&w1, 1, [1.0, 0.0, 0.0]), embedded(&w2, 1, [0.0, 1.0, 0.0])])
            .unwrap();

        let mut topic = detected("COMP3001", "Shared", &w1);
        topic.appearances.extend(detected("COMP3001", "x", &w2).appearances);
        storage.replace_topics("COMP3001", &[topic.clone()]).unwrap();

        assert!(storage.delete_lecture("COMP3001", &w1.lecture_id).unwrap());
        assert!(!storage.delete_lecture("COMP3001", &w1.lecture_id).unwrap());

        let chunks = storage.module_chunks("COMP3001").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.lecture_id, w2.lecture_id);

        let stored = storage
            .get_topic_with_appearances("COMP3001", &topic.topic.topic_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.appearances.len(), 1);
        assert_eq!(stored.appearances[0].lecture_id, w2.lecture_id);
    }

    #[test]
    fn test_stats() {
        let (storage, _temp) = create_test_storage();
        let lecture = seed_lecture(&storage, "COMP3001", 1, "Intro");
        storage
            .put_chunks(&[embedded(&lecture, 1, [1.0, 0.0, 0.0]), Chunk::new(&lecture, "raw", 2)])
            .unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.lecture_count, 1);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedded_chunk_count, 1);
        assert_eq!(stats.module_count, 1);
        assert_eq!(stats.embedding_dimension, DIM);
    }

    #[test]
    fn test_module_code_with_separator_rejected() {
        let (storage, _temp) = create_test_storage();
        assert!(matches!(
            storage.list_lectures("COMP:3001"),
            Err(StorageError::Key(_))
        ));
    }
}
