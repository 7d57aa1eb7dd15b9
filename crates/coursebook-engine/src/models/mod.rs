pub mod block;
pub mod chapter;
pub mod inline;

pub use block::{
    Appearance, Block, BlockError, BlockId, BlockKind, BlockType, Embed, HeadingLevel,
    RichTextKind, TextAlignment, is_rich_text_block,
};
pub use chapter::{Chapter, ChapterId, Snapshot, normalize_blocks};
pub use inline::{InlineContent, StyledText, Styles};
