use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Block, Chapter, ChapterId};
use crate::store::{ChapterStore, StoreError};

/// Chapter store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryChapterStore {
    chapters: RwLock<HashMap<ChapterId, Chapter>>,
}

impl MemoryChapterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `chapters`, normalizing each one
    pub fn with_chapters(chapters: impl IntoIterator<Item = Chapter>) -> Self {
        let chapters = chapters
            .into_iter()
            .map(|chapter| {
                let chapter = Chapter::normalized(chapter.id, chapter.blocks);
                (chapter.id.clone(), chapter)
            })
            .collect();
        Self {
            chapters: RwLock::new(chapters),
        }
    }

    pub async fn len(&self) -> usize {
        self.chapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chapters.read().await.is_empty()
    }
}

#[async_trait]
impl ChapterStore for MemoryChapterStore {
    async fn get(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        self.chapters
            .read()
            .await
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(chapter_id.clone()))
    }

    async fn save(
        &self,
        chapter_id: &ChapterId,
        blocks: Vec<Block>,
    ) -> Result<Chapter, StoreError> {
        let mut chapters = self.chapters.write().await;
        let Some(existing) = chapters.get_mut(chapter_id) else {
            return Err(StoreError::NotFound(chapter_id.clone()));
        };
        *existing = Chapter::normalized(chapter_id.clone(), blocks);
        log::debug!(
            "Saved {} blocks to chapter {chapter_id}",
            existing.blocks.len()
        );
        Ok(existing.clone())
    }

    async fn create(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        let mut chapters = self.chapters.write().await;
        if chapters.contains_key(chapter_id) {
            return Err(StoreError::AlreadyExists(chapter_id.clone()));
        }
        let chapter = Chapter::empty(chapter_id.clone());
        chapters.insert(chapter_id.clone(), chapter.clone());
        Ok(chapter)
    }

    async fn delete(&self, chapter_id: &ChapterId) -> Result<(), StoreError> {
        self.chapters
            .write()
            .await
            .remove(chapter_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(chapter_id.clone()))
    }
}
