//! Key encoding and decoding for storage layer.
//!
//! Every key starts with a type prefix followed by the module code, so all of
//! a module's records of one kind form a single contiguous range:
//! - `lec:{module}:{lecture_id}`
//! - `chk:{module}:{lecture_id}:{chunk_id}`
//! - `top:{module}:{topic_id}`
//! - `app:{module}:{topic_id}:{lecture_id}`
//!
//! Segments never contain `:`. Module codes are validated on the way in and
//! IDs are ULIDs.

use crate::error::StorageError;

/// Reject segments that would break the key layout.
pub fn validate_segment(kind: &str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::Key(format!("{kind} must not be empty")));
    }
    if value.contains(':') {
        return Err(StorageError::Key(format!(
            "{kind} must not contain ':': {value}"
        )));
    }
    Ok(())
}

fn split_key<'a>(bytes: &'a [u8], prefix: &str, parts: usize) -> Result<Vec<&'a str>, StorageError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
    let segments: Vec<&str> = s.split(':').collect();
    if segments.len() != parts || segments[0] != prefix {
        return Err(StorageError::Key(format!("Invalid {} key format: {}", prefix, s)));
    }
    Ok(segments)
}

/// Key for lecture storage
/// Format: lec:{module}:{lecture_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureKey {
    pub module_code: String,
    pub lecture_id: String,
}

impl LectureKey {
    pub fn new(module_code: &str, lecture_id: &str) -> Self {
        Self {
            module_code: module_code.to_string(),
            lecture_id: lecture_id.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("lec:{}:{}", self.module_code, self.lecture_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let parts = split_key(bytes, "lec", 3)?;
        Ok(Self::new(parts[1], parts[2]))
    }

    /// Prefix covering every lecture of a module
    pub fn module_prefix(module_code: &str) -> Vec<u8> {
        format!("lec:{}:", module_code).into_bytes()
    }
}

/// Key for chunk storage
/// Format: chk:{module}:{lecture_id}:{chunk_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    pub module_code: String,
    pub lecture_id: String,
    pub chunk_id: String,
}

impl ChunkKey {
    pub fn new(module_code: &str, lecture_id: &str, chunk_id: &str) -> Self {
        Self {
            module_code: module_code.to_string(),
            lecture_id: lecture_id.to_string(),
            chunk_id: chunk_id.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "chk:{}:{}:{}",
            self.module_code, self.lecture_id, self.chunk_id
        )
        .into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let parts = split_key(bytes, "chk", 4)?;
        Ok(Self::new(parts[1], parts[2], parts[3]))
    }

    /// Prefix covering every chunk of a module
    pub fn module_prefix(module_code: &str) -> Vec<u8> {
        format!("chk:{}:", module_code).into_bytes()
    }

    /// Prefix covering every chunk of one lecture
    pub fn lecture_prefix(module_code: &str, lecture_id: &str) -> Vec<u8> {
        format!("chk:{}:{}:", module_code, lecture_id).into_bytes()
    }
}

/// Key for topic storage
/// Format: top:{module}:{topic_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicKey {
    pub module_code: String,
    pub topic_id: String,
}

impl TopicKey {
    pub fn new(module_code: &str, topic_id: &str) -> Self {
        Self {
            module_code: module_code.to_string(),
            topic_id: topic_id.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("top:{}:{}", self.module_code, self.topic_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let parts = split_key(bytes, "top", 3)?;
        Ok(Self::new(parts[1], parts[2]))
    }

    /// Prefix covering every topic of a module
    pub fn module_prefix(module_code: &str) -> Vec<u8> {
        format!("top:{}:", module_code).into_bytes()
    }
}

/// Key for topic appearance storage
/// Format: app:{module}:{topic_id}:{lecture_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppearanceKey {
    pub module_code: String,
    pub topic_id: String,
    pub lecture_id: String,
}

impl AppearanceKey {
    pub fn new(module_code: &str, topic_id: &str, lecture_id: &str) -> Self {
        Self {
            module_code: module_code.to_string(),
            topic_id: topic_id.to_string(),
            lecture_id: lecture_id.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "app:{}:{}:{}",
            self.module_code, self.topic_id, self.lecture_id
        )
        .into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let parts = split_key(bytes, "app", 4)?;
        Ok(Self::new(parts[1], parts[2], parts[3]))
    }

    /// Prefix covering every appearance in a module
    pub fn module_prefix(module_code: &str) -> Vec<u8> {
        format!("app:{}:", module_code).into_bytes()
    }

    /// Prefix covering every appearance of one topic
    pub fn topic_prefix(module_code: &str, topic_id: &str) -> Vec<u8> {
        format!("app:{}:{}:", module_code, topic_id).into_bytes()
    }
}
