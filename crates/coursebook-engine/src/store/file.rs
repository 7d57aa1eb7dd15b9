use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::models::{Block, Chapter, ChapterId};
use crate::store::{ChapterStore, StoreError};

/// Chapter store keeping one JSON document per chapter under a data directory
#[derive(Debug, Clone)]
pub struct FileChapterStore {
    root: PathBuf,
}

impl FileChapterStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("chapters"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chapter_path(&self, chapter_id: &ChapterId) -> Result<PathBuf, StoreError> {
        let id = chapter_id.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidChapterId(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    async fn read(&self, chapter_id: &ChapterId) -> Result<Option<Chapter>, StoreError> {
        let path = self.chapter_path(chapter_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let chapter =
            serde_json::from_str(&content).map_err(|source| StoreError::Serialization {
                chapter_id: chapter_id.clone(),
                source,
            })?;
        Ok(Some(chapter))
    }

    async fn write(&self, chapter: &Chapter) -> Result<(), StoreError> {
        let path = self.chapter_path(&chapter.id)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;

        let content =
            serde_json::to_string_pretty(chapter).map_err(|source| StoreError::Serialization {
                chapter_id: chapter.id.clone(),
                source,
            })?;

        // Readers must never observe a partially written chapter, and
        // concurrent writers each stage their own file
        let tmp_path = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        if let Err(source) = tokio::fs::write(&tmp_path, content).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io {
                path: tmp_path,
                source,
            });
        }
        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io { path, source });
        }
        Ok(())
    }
}

#[async_trait]
impl ChapterStore for FileChapterStore {
    async fn get(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        self.read(chapter_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(chapter_id.clone()))
    }

    /// Saving an unknown chapter creates it
    async fn save(
        &self,
        chapter_id: &ChapterId,
        blocks: Vec<Block>,
    ) -> Result<Chapter, StoreError> {
        let chapter = Chapter::normalized(chapter_id.clone(), blocks);
        self.write(&chapter).await?;
        log::debug!(
            "Wrote {} blocks for chapter {chapter_id} to {}",
            chapter.blocks.len(),
            self.root.display()
        );
        Ok(chapter)
    }

    async fn create(&self, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
        if self.read(chapter_id).await?.is_some() {
            return Err(StoreError::AlreadyExists(chapter_id.clone()));
        }
        let chapter = Chapter::empty(chapter_id.clone());
        self.write(&chapter).await?;
        Ok(chapter)
    }

    async fn delete(&self, chapter_id: &ChapterId) -> Result<(), StoreError> {
        let path = self.chapter_path(chapter_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(chapter_id.clone()))
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}
