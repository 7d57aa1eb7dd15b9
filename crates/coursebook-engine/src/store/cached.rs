use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::models::{Block, Chapter, ChapterId};
use crate::store::{ChapterStore, StoreError};

/// Read-through cache in front of another chapter store.
///
/// Writes go straight to the inner store and evict the cached copy, so the
/// next `get` observes whatever the inner store persisted. Every eviction
/// bumps the chapter's generation; a read that started under an older
/// generation is returned to its caller but never cached.
#[derive(Debug)]
pub struct CachedChapterStore<S> {
    inner: S,
    cache: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ChapterId, Chapter>,
    generations: HashMap<ChapterId, u64>,
}

impl CacheState {
    fn generation(&self, chapter_id: &ChapterId) -> u64 {
        self.generations.get(chapter_id).copied().unwrap_or_default()
    }
}

impl<S: ChapterStore> CachedChapterStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(CacheState::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn is_cached(&self, chapter_id: &ChapterId) -> bool {
        self.cache().entries.contains_key(chapter_id)
    }

    fn cache(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: ChapterStore> ChapterStore for CachedChapterStore<S> {
    async fn get(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        let generation = {
            let cache = self.cache();
            if let Some(chapter) = cache.entries.get(chapter_id) {
                return Ok(chapter.clone());
            }
            cache.generation(chapter_id)
        };

        let chapter = self.inner.get(chapter_id).await?;

        let mut cache = self.cache();
        if cache.generation(chapter_id) == generation {
            cache.entries.insert(chapter_id.clone(), chapter.clone());
        } else {
            log::debug!("Not caching read of chapter {chapter_id} that raced a write");
        }
        Ok(chapter)
    }

    async fn save(
        &self,
        chapter_id: &ChapterId,
        blocks: Vec<Block>,
    ) -> Result<Chapter, StoreError> {
        let saved = self.inner.save(chapter_id, blocks).await;
        self.invalidate(chapter_id);
        saved
    }

    async fn create(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        self.inner.create(chapter_id).await
    }

    async fn delete(&self, chapter_id: &ChapterId) -> Result<(), StoreError> {
        let deleted = self.inner.delete(chapter_id).await;
        self.invalidate(chapter_id);
        deleted
    }

    fn invalidate(&self, chapter_id: &ChapterId) {
        {
            let mut cache = self.cache();
            *cache.generations.entry(chapter_id.clone()).or_default() += 1;
            if cache.entries.remove(chapter_id).is_some() {
                log::debug!("Evicted cached chapter {chapter_id}");
            }
        }
        self.inner.invalidate(chapter_id);
    }
}
