//! Column family definitions for RocksDB.
//!
//! - lectures: lecture metadata, keyed by module
//! - chunks: chunk content and embeddings (compressed)
//! - topics: detected topics, keyed by module
//! - topic_appearances: topic-to-lecture links, keyed by module and topic
//! - meta: store-wide settings such as the embedding dimension

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for lectures
pub const CF_LECTURES: &str = "lectures";

/// Column family name for chunks
pub const CF_CHUNKS: &str = "chunks";

/// Column family for topic records
pub const CF_TOPICS: &str = "topics";

/// Column family for topic appearances
pub const CF_APPEARANCES: &str = "topic_appearances";

/// Column family for store metadata
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_LECTURES, CF_CHUNKS, CF_TOPICS, CF_APPEARANCES, CF_META];

/// Chunks hold the bulk of the data (text plus embedding vectors)
fn chunks_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_LECTURES, Options::default()),
        ColumnFamilyDescriptor::new(CF_CHUNKS, chunks_options()),
        ColumnFamilyDescriptor::new(CF_TOPICS, Options::default()),
        ColumnFamilyDescriptor::new(CF_APPEARANCES, Options::default()),
        ColumnFamilyDescriptor::new(CF_META, Options::default()),
    ]
}
