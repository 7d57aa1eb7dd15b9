//! Persistence of chapter block lists.
//!
//! A chapter's blocks are replaced wholesale on every save; the store is
//! authoritative for what was persisted and renormalizes positions.

pub mod cached;
pub mod file;
pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::models::{Block, Chapter, ChapterId};

pub use cached::CachedChapterStore;
pub use file::FileChapterStore;
pub use memory::MemoryChapterStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Chapter not found: {0}")]
    NotFound(ChapterId),
    #[error("Chapter already exists: {0}")]
    AlreadyExists(ChapterId),
    #[error("Invalid chapter id: {0:?}")]
    InvalidChapterId(String),
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to (de)serialize chapter {chapter_id}: {source}")]
    Serialization {
        chapter_id: ChapterId,
        source: serde_json::Error,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read/replace access to chapter documents
#[async_trait]
pub trait ChapterStore: Send + Sync {
    async fn get(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError>;

    /// Replace the chapter's blocks and return the chapter as persisted
    async fn save(&self, chapter_id: &ChapterId, blocks: Vec<Block>)
    -> Result<Chapter, StoreError>;

    async fn create(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError>;

    /// Remove the chapter together with all of its blocks
    async fn delete(&self, chapter_id: &ChapterId) -> Result<(), StoreError>;

    /// Forget any cached read of the chapter
    fn invalidate(&self, _chapter_id: &ChapterId) {}
}
