//! Shared fixtures for unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Block, Chapter, ChapterId};
use crate::render::DefaultHtmlRenderer;
use crate::store::{ChapterStore, StoreError};

/// In-memory store that records successful saves, can be told to fail and
/// can answer reads slowly
#[derive(Debug, Default)]
pub struct RecordingStore {
    chapters: Mutex<HashMap<ChapterId, Chapter>>,
    saves: Mutex<Vec<(ChapterId, Vec<Block>)>>,
    failures_left: Mutex<usize>,
    load_delay: Mutex<Duration>,
}

/// A paragraph block with its HTML already rendered, as the server stores it
pub fn rendered_paragraph(id: &str, text: &str) -> Block {
    let mut block = Block::paragraph(text).with_id(id);
    block.html = Some(DefaultHtmlRenderer.render(&block));
    block
}

impl RecordingStore {
    pub fn with_chapter(id: &str, text: &str) -> Self {
        let store = Self::default();
        store.insert(id, text);
        store
    }

    pub fn insert(&self, id: &str, text: &str) {
        let chapter = Chapter::normalized(ChapterId::from(id), vec![rendered_paragraph("b1", text)]);
        self.chapters.lock().unwrap().insert(chapter.id.clone(), chapter);
    }

    pub fn fail_next_saves(&self, count: usize) {
        *self.failures_left.lock().unwrap() = count;
    }

    /// Delay every `get` response; the chapter is read before the delay
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = delay;
    }

    pub fn saves(&self) -> Vec<(ChapterId, Vec<Block>)> {
        self.saves.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }
}

#[async_trait]
impl ChapterStore for RecordingStore {
    async fn get(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        let read = self
            .chapters
            .lock()
            .unwrap()
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(chapter_id.clone()));
        let delay = *self.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        read
    }

    async fn save(
        &self,
        chapter_id: &ChapterId,
        blocks: Vec<Block>,
    ) -> Result<Chapter, StoreError> {
        {
            let mut failures_left = self.failures_left.lock().unwrap();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
        }

        let chapter = Chapter::normalized(chapter_id.clone(), blocks.clone());
        self.chapters
            .lock()
            .unwrap()
            .insert(chapter_id.clone(), chapter.clone());
        self.saves.lock().unwrap().push((chapter_id.clone(), blocks));
        Ok(chapter)
    }

    async fn create(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        let chapter = Chapter::empty(chapter_id.clone());
        self.chapters
            .lock()
            .unwrap()
            .insert(chapter_id.clone(), chapter.clone());
        Ok(chapter)
    }

    async fn delete(&self, chapter_id: &ChapterId) -> Result<(), StoreError> {
        self.chapters
            .lock()
            .unwrap()
            .remove(chapter_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(chapter_id.clone()))
    }
}
