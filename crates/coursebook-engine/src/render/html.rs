use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::models::{
    Block, BlockId, BlockKind, ChapterId, InlineContent, RichTextKind, Snapshot, StyledText,
    normalize_blocks,
};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to render block {block_id}: {message}")]
    Failed { block_id: BlockId, message: String },
}

/// Renders a block to HTML on behalf of the editor surface.
///
/// Rendering may be asynchronous (an embedded editor engine, a worker), so
/// callers await each block and join the results.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    async fn render_block(&self, block: &Block) -> Result<String, RenderError>;
}

/// Renders rich-text blocks to plain semantic HTML
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHtmlRenderer;

impl DefaultHtmlRenderer {
    /// HTML for one block and its nested children; embeds render empty
    pub fn render(&self, block: &Block) -> String {
        let BlockKind::RichText { kind, content } = &block.kind else {
            return String::new();
        };

        let inner = render_inline(content);
        let children: String = block.children.iter().map(|child| self.render(child)).collect();

        match kind {
            RichTextKind::Paragraph => format!("<p>{inner}</p>{children}"),
            RichTextKind::Heading(level) => {
                let n = level.get();
                format!("<h{n}>{inner}</h{n}>{children}")
            }
            RichTextKind::BulletListItem => format!("<ul><li>{inner}{children}</li></ul>"),
            RichTextKind::NumberedListItem => format!("<ol><li>{inner}{children}</li></ol>"),
        }
    }
}

#[async_trait]
impl HtmlRenderer for DefaultHtmlRenderer {
    async fn render_block(&self, block: &Block) -> Result<String, RenderError> {
        Ok(self.render(block))
    }
}

/// HTML for a sequence of inline nodes
pub fn render_inline(content: &[InlineContent]) -> String {
    let mut html = String::new();
    for node in content {
        match node {
            InlineContent::Text(run) => html.push_str(&render_run(run)),
            InlineContent::Link { href, content } => {
                let label: String = content.iter().map(render_run).collect();
                if is_safe_href(href) {
                    html.push_str("<a href=\"");
                    html.push_str(&html_escape::encode_double_quoted_attribute(href));
                    html.push_str("\">");
                    html.push_str(&label);
                    html.push_str("</a>");
                } else {
                    html.push_str(&label);
                }
            }
        }
    }
    html
}

fn is_safe_href(href: &str) -> bool {
    ["http://", "https://", "mailto:"]
        .iter()
        .any(|scheme| href.starts_with(scheme))
}

fn render_run(run: &StyledText) -> String {
    let styles = &run.styles;
    let mut html = html_escape::encode_text(&run.text).into_owned();

    for (enabled, tag) in [
        (styles.code, "code"),
        (styles.strike, "s"),
        (styles.underline, "u"),
        (styles.italic, "em"),
        (styles.bold, "strong"),
    ] {
        if enabled {
            html = format!("<{tag}>{html}</{tag}>");
        }
    }

    if let Some(color) = &styles.text_color {
        html = format!(
            "<span data-text-color=\"{}\">{html}</span>",
            html_escape::encode_double_quoted_attribute(color)
        );
    }
    if let Some(color) = &styles.background_color {
        html = format!(
            "<span data-background-color=\"{}\">{html}</span>",
            html_escape::encode_double_quoted_attribute(color)
        );
    }

    html
}

/// Render every top-level rich-text block concurrently and assemble the
/// result in the original order.
///
/// Positions and the owning chapter are stamped from array order. A block
/// whose rendering fails keeps whatever HTML it had cached before.
pub async fn render_snapshot(
    renderer: Arc<dyn HtmlRenderer>,
    chapter_id: ChapterId,
    mut blocks: Vec<Block>,
) -> Snapshot {
    normalize_blocks(&chapter_id, &mut blocks);

    let mut tasks = JoinSet::new();
    for (index, block) in blocks.iter().enumerate() {
        if !block.is_rich_text() {
            continue;
        }
        let renderer = Arc::clone(&renderer);
        let block = block.clone();
        tasks.spawn(async move { (index, renderer.render_block(&block).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(html))) => blocks[index].html = Some(html),
            Ok((index, Err(e))) => {
                log::warn!(
                    "Keeping cached HTML for block {} in chapter {chapter_id}: {e}",
                    blocks[index].id
                );
            }
            Err(e) => log::warn!("Render task for chapter {chapter_id} did not complete: {e}"),
        }
    }

    Snapshot { chapter_id, blocks }
}
