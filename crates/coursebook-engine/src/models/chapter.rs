use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::block::Block;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub String);

impl ChapterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChapterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChapterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One lesson: an ordered list of blocks it exclusively owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Chapter {
    pub fn empty(id: ChapterId) -> Self {
        Self {
            id,
            blocks: Vec::new(),
        }
    }

    /// Build a chapter whose blocks carry positions and owner derived from order
    pub fn normalized(id: ChapterId, mut blocks: Vec<Block>) -> Self {
        normalize_blocks(&id, &mut blocks);
        Self { id, blocks }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            chapter_id: self.id.clone(),
            blocks: self.blocks.clone(),
        }
    }
}

/// Re-derive `position` from array order and stamp the owning chapter, at
/// every nesting level.
pub fn normalize_blocks(chapter_id: &ChapterId, blocks: &mut [Block]) {
    for (index, block) in blocks.iter_mut().enumerate() {
        block.position = u32::try_from(index).unwrap_or(u32::MAX);
        block.chapter_id = Some(chapter_id.clone());
        normalize_blocks(chapter_id, &mut block.children);
    }
}

/// A chapter's blocks at one point in time, compared structurally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub chapter_id: ChapterId,
    pub blocks: Vec<Block>,
}

impl From<Chapter> for Snapshot {
    fn from(chapter: Chapter) -> Self {
        Self {
            chapter_id: chapter.id,
            blocks: chapter.blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::block::{BlockId, RichTextKind};
    use crate::models::inline::InlineContent;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_positions_and_owner_recursively() {
        let chapter_id = ChapterId::from("c1");
        let mut blocks = vec![
            Block::paragraph("a").with_id("a"),
            Block::rich_text(RichTextKind::BulletListItem, vec![InlineContent::text("b")])
                .with_id("b")
                .with_children(vec![
                    Block::paragraph("b1").with_id("b1"),
                    Block::paragraph("b2").with_id("b2"),
                ]),
        ];
        blocks[0].position = 17;

        normalize_blocks(&chapter_id, &mut blocks);

        assert_eq!(
            blocks.iter().map(|b| b.position).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(
            blocks[1].children.iter().map(|b| b.position).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(
            blocks
                .iter()
                .chain(blocks[1].children.iter())
                .all(|b| b.chapter_id == Some(chapter_id.clone()))
        );
    }

    #[test]
    fn snapshots_compare_structurally() {
        let chapter = Chapter::normalized(
            ChapterId::from("c1"),
            vec![Block::paragraph("same").with_id("x")],
        );
        let copy = Chapter::normalized(
            ChapterId::from("c1"),
            vec![Block::paragraph("same").with_id("x")],
        );
        assert_eq!(chapter.snapshot(), copy.snapshot());

        let mut edited = copy.snapshot();
        edited.blocks[0] = Block::paragraph("different").with_id("x");
        assert_ne!(chapter.snapshot(), edited);
        assert_eq!(edited.blocks[0].id, BlockId::from("x"));
    }
}
