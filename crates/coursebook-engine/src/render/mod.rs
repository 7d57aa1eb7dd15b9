//! Serialization of chapter blocks to HTML and Markdown.
//!
//! `blocks_to_html` never renders anything itself: it stitches together the
//! HTML each rich-text block cached when it was last rendered. Filling that
//! cache is the job of an [`HtmlRenderer`], normally via [`render_snapshot`].

pub mod html;
pub mod markdown;

pub use html::{DefaultHtmlRenderer, HtmlRenderer, RenderError, render_inline, render_snapshot};
pub use markdown::blocks_to_markdown;

use crate::models::Block;

/// Cached HTML of a block, or an empty string when nothing is cached
pub fn block_to_html(block: &Block) -> String {
    block.html.clone().unwrap_or_default()
}

/// Concatenate the cached HTML of `blocks` in order, without separators
pub fn blocks_to_html(blocks: &[Block]) -> String {
    blocks.iter().map(block_to_html).collect()
}
