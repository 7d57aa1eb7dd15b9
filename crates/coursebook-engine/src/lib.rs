pub mod embed;
pub mod import;
pub mod models;
pub mod render;
pub mod store;
pub mod sync;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use embed::{EmbedError, EmbedProvider, EmbedUrl, extract_src_from_iframe};
pub use import::markdown_to_blocks;
pub use models::*;
pub use render::{
    DefaultHtmlRenderer, HtmlRenderer, RenderError, block_to_html, blocks_to_html,
    blocks_to_markdown, render_snapshot,
};
pub use store::{
    CachedChapterStore, ChapterStore, FileChapterStore, MemoryChapterStore, StoreError,
};
pub use sync::{
    EditorDocument, EditorSession, RetryPolicy, SaveStatus, SessionError, SessionHandle,
    SyncSettings,
};
