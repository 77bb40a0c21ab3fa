//! Command implementations.
//!
//! Every command loads settings, opens storage, builds only the gateways
//! it needs and prints its result as JSON on stdout.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lecture_embeddings::{build_embedding_gateway, EmbeddingGateway};
use lecture_generation::build_generator;
use lecture_retrieval::{QueryRequest, RetrievalEngine};
use lecture_storage::Storage;
use lecture_topics::{module_stats, overall_stats, TopicDetector};
use lecture_types::{Chunk, Lecture, Settings};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::{Cli, Commands};

/// Pre-extracted lecture as read by `import`.
#[derive(Debug, Clone, Deserialize)]
pub struct LectureImport {
    pub module_code: String,
    pub week_number: u32,
    pub title: String,
    pub filename: String,
    #[serde(default)]
    pub num_pages: Option<u32>,
    pub chunks: Vec<ChunkImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkImport {
    pub slide_number: u32,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ImportSummary {
    lecture_id: String,
    module_code: String,
    chunks: usize,
    embedded: usize,
}

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = &cli.db_path {
        settings.storage.db_path = db_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Install the tracing subscriber. Logs go to stderr so stdout stays JSON.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open (creating if needed) the configured RocksDB store.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.storage.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    info!(path = ?db_path, "Opening storage");
    let storage = Storage::open(&db_path, settings.storage.embedding_dimension)
        .context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

fn embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingGateway>> {
    build_embedding_gateway(&settings.embedding, settings.storage.embedding_dimension)
        .context("Failed to initialise embedding gateway")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Embed every chunk of a module that has no embedding yet.
///
/// Returns the number of chunks embedded. Either all pending chunks are
/// updated or none are.
pub async fn embed_pending(
    storage: &Storage,
    embedder: &dyn EmbeddingGateway,
    module_code: &str,
) -> Result<usize> {
    let pending = storage
        .chunks_missing_embeddings(module_code)
        .context("Failed to read pending chunks")?;
    if pending.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder
        .embed_many(&texts)
        .await
        .context("Failed to embed chunks")?;

    let embedded: Vec<Chunk> = pending
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| chunk.with_embedding(vector))
        .collect();
    let count = storage
        .attach_embeddings(&embedded)
        .context("Failed to store embeddings")?;
    info!(module = module_code, count, "Embedded pending chunks");
    Ok(count)
}

/// Store a pre-extracted lecture and its chunks, then embed every pending
/// chunk of its module.
pub async fn import_lecture(
    storage: &Storage,
    embedder: &dyn EmbeddingGateway,
    import: LectureImport,
) -> Result<(Lecture, usize)> {
    if import.chunks.is_empty() {
        bail!("lecture '{}' has no chunks", import.title);
    }

    let mut lecture = Lecture::new(
        &import.module_code,
        import.week_number,
        import.title,
        import.filename,
    );
    if let Some(pages) = import.num_pages {
        lecture = lecture.with_num_pages(pages);
    }
    storage.put_lecture(&lecture).context("Failed to store lecture")?;

    let chunks: Vec<Chunk> = import
        .chunks
        .iter()
        .filter(|c| !c.content.trim().is_empty())
        .map(|c| Chunk::new(&lecture, c.content.clone(), c.slide_number))
        .collect();
    if let Err(e) = storage.put_chunks(&chunks) {
        // put_chunks writes nothing on rejection, so only the lecture remains
        storage
            .delete_lecture(&lecture.module_code, &lecture.lecture_id)
            .context("Failed to remove lecture after rejected chunks")?;
        return Err(anyhow::Error::new(e).context("Failed to store chunks"));
    }

    let embedded = embed_pending(storage, embedder, &lecture.module_code).await?;
    Ok((lecture, embedded))
}

fn read_import(path: &Path) -> Result<LectureImport> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid lecture file {}", path.display()))
}

/// Run one CLI command.
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Ask {
            module,
            question,
            top_k,
            week,
            no_temporal_filter,
        } => {
            let storage = open_storage(&settings)?;
            let generator = build_generator(&settings.generation)
                .context("Failed to initialise generation gateway")?;
            let engine = RetrievalEngine::new(
                storage,
                embedder(&settings)?,
                generator,
                settings.retrieval.clone(),
                &settings.generation,
            );

            let request = QueryRequest {
                question,
                module_code: module,
                top_k,
                temporal_filter: !no_temporal_filter,
                current_week: week,
            };
            print_json(&engine.answer(request).await?)?;
        }

        Commands::Summarize { module, topic_id } => {
            let storage = open_storage(&settings)?;
            let generator = build_generator(&settings.generation)
                .context("Failed to initialise generation gateway")?;
            let engine = RetrievalEngine::for_summaries(
                storage,
                generator,
                settings.retrieval.clone(),
                &settings.generation,
            );
            print_json(&engine.summarize(&topic_id, &module).await?)?;
        }

        Commands::Detect {
            module,
            method,
            min_cluster_size,
        } => {
            if let Some(method) = method {
                settings.topics.clustering_method = method;
            }
            if let Some(size) = min_cluster_size {
                settings.topics.min_cluster_size = size;
            }
            settings
                .topics
                .validate()
                .map_err(anyhow::Error::msg)
                .context("Invalid topic settings")?;

            let storage = open_storage(&settings)?;
            let generator = build_generator(&settings.generation)
                .context("Failed to initialise generation gateway")?;
            let detector = TopicDetector::new(
                storage,
                generator,
                settings.topics.clone(),
                &settings.generation,
            );
            print_json(&detector.detect(&module).await?)?;
        }

        Commands::Topics { module } => {
            let storage = open_storage(&settings)?;
            print_json(&storage.list_topics(&module)?)?;
        }

        Commands::Map { module } => {
            let storage = open_storage(&settings)?;
            let topics = storage.list_topics(&module)?;
            print_json(&lecture_topics::TopicMap::build(&topics))?;
        }

        Commands::Lectures { module } => {
            let storage = open_storage(&settings)?;
            print_json(&storage.list_lectures(&module)?)?;
        }

        Commands::Stats { module, storage: raw } => {
            let storage = open_storage(&settings)?;
            if raw {
                print_json(&storage.get_stats()?)?;
            } else if let Some(module) = module {
                print_json(&module_stats(&storage, &module)?)?;
            } else {
                print_json(&overall_stats(&storage)?)?;
            }
        }

        Commands::Import { file } => {
            let import = read_import(Path::new(&file))?;
            let storage = open_storage(&settings)?;
            let embedder = embedder(&settings)?;
            let (lecture, embedded) = import_lecture(&storage, embedder.as_ref(), import).await?;
            let chunks = storage
                .lecture_chunks(
                    &lecture.module_code,
                    std::slice::from_ref(&lecture.lecture_id),
                    usize::MAX,
                )?
                .len();
            print_json(&ImportSummary {
                lecture_id: lecture.lecture_id,
                module_code: lecture.module_code,
                chunks,
                embedded,
            })?;
        }

        Commands::EmbedPending { module } => {
            let storage = open_storage(&settings)?;
            let embedder = embedder(&settings)?;
            let count = embed_pending(&storage, embedder.as_ref(), &module).await?;
            print_json(&serde_json::json!({ "module_code": module, "embedded": count }))?;
        }

        Commands::DeleteTopic { module, topic_id } => {
            let storage = open_storage(&settings)?;
            if !storage.delete_topic(&module, &topic_id)? {
                bail!("Topic {topic_id} not found in module {module}");
            }
            print_json(&serde_json::json!({ "deleted": topic_id }))?;
        }

        Commands::DeleteLecture { module, lecture_id } => {
            let storage = open_storage(&settings)?;
            if !storage.delete_lecture(&module, &lecture_id)? {
                bail!("Lecture {lecture_id} not found in module {module}");
            }
            print_json(&serde_json::json!({ "deleted": lecture_id }))?;
        }

        Commands::Health => {
            let generator = build_generator(&settings.generation)
                .context("Failed to initialise generation gateway")?;
            let healthy = generator.health_check().await;
            print_json(&serde_json::json!({
                "generator": generator.name(),
                "healthy": healthy,
            }))?;
            if !healthy {
                bail!("{} backend is not reachable", generator.name());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lecture_embeddings::MockEmbedder;
    use tempfile::TempDir;

    fn import(chunks: &[(u32, &str)]) -> LectureImport {
        LectureImport {
            module_code: "comp3001".to_string(),
            week_number: 2,
            title: "Sorting".to_string(),
            filename: "week2.pdf".to_string(),
            num_pages: Some(12),
            chunks: chunks
                .iter()
                .map(|(slide, content)| ChunkImport {
                    slide_number: *slide,
                    content: content.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_import_embeds_chunks() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), 4).unwrap();
        let embedder = MockEmbedder::new(4);

        let (lecture, embedded) = import_lecture(
            &storage,
            &embedder,
            import(&[(1, "Merge sort"), (2, "   "), (3, "Quick sort")]),
        )
        .await
        .unwrap();

        assert_eq!(lecture.module_code, "COMP3001");
        assert_eq!(lecture.num_pages, Some(12));
        assert_eq!(embedded, 2);
        assert_eq!(storage.module_chunks("COMP3001").unwrap().len(), 2);
        assert_eq!(embedder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_import_without_chunks_fails() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), 4).unwrap();
        let result = import_lecture(&storage, &MockEmbedder::new(4), import(&[])).await;
        assert!(result.is_err());
        assert!(storage.list_lectures("COMP3001").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_with_invalid_slide_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), 4).unwrap();
        let embedder = MockEmbedder::new(4);

        let result = import_lecture(&storage, &embedder, import(&[(1, "Merge sort"), (0, "Cover")])).await;
        assert!(result.is_err());
        assert!(storage.list_lectures("COMP3001").unwrap().is_empty());
        assert!(storage.module_chunks("COMP3001").unwrap().is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_embed_pending_only_touches_missing() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), 4).unwrap();
        let lecture = Lecture::new("COMP3001", 1, "Intro", "intro.pdf");
        storage.put_lecture(&lecture).unwrap();
        storage
            .put_chunks(&[
                Chunk::new(&lecture, "done", 1).with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
                Chunk::new(&lecture, "pending", 2),
            ])
            .unwrap();

        let embedder = MockEmbedder::new(4);
        assert_eq!(embed_pending(&storage, &embedder, "COMP3001").await.unwrap(), 1);
        assert_eq!(embed_pending(&storage, &embedder, "COMP3001").await.unwrap(), 0);
        assert_eq!(embedder.call_count(), 1);
        assert_eq!(storage.module_chunks("COMP3001").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_embed_pending_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), 4).unwrap();
        let lecture = Lecture::new("COMP3001", 1, "Intro", "intro.pdf");
        storage.put_lecture(&lecture).unwrap();
        storage.put_chunks(&[Chunk::new(&lecture, "pending", 1)]).unwrap();

        let result = embed_pending(&storage, &MockEmbedder::failing(4), "COMP3001").await;
        assert!(result.is_err());
        assert_eq!(storage.chunks_missing_embeddings("COMP3001").unwrap().len(), 1);
    }

    #[test]
    fn test_import_file_format() {
        let raw = r#"{
            "module_code": "COMP3001",
            "week_number": 1,
            "title": "Intro",
            "filename": "intro.pdf",
            "chunks": [{"slide_number": 1, "content": "Welcome"}]
        }"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intro.json");
        fs::write(&path, raw).unwrap();

        let import = read_import(&path).unwrap();
        assert_eq!(import.num_pages, None);
        assert_eq!(import.chunks[0].content, "Welcome");
    }
}
