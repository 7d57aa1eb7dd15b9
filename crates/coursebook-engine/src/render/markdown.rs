use crate::models::{Block, BlockKind, Embed, InlineContent, RichTextKind, StyledText};

/// Export blocks as Markdown.
///
/// Consecutive list items are kept together; every other top-level block is
/// separated by a blank line.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous_was_list = false;

    for block in blocks {
        let is_list = is_list_item(block);
        if !out.is_empty() {
            out.push_str(if is_list && previous_was_list { "\n" } else { "\n\n" });
        }
        write_block(&mut out, block, 0);
        previous_was_list = is_list;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn is_list_item(block: &Block) -> bool {
    matches!(
        block.kind,
        BlockKind::RichText {
            kind: RichTextKind::BulletListItem | RichTextKind::NumberedListItem,
            ..
        }
    )
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    let indent = "  ".repeat(depth);

    match &block.kind {
        BlockKind::RichText { kind, content } => {
            let text = inline_to_markdown(content);
            match kind {
                RichTextKind::Paragraph => {
                    out.push_str(&indent);
                    out.push_str(&text);
                }
                RichTextKind::Heading(level) => {
                    out.push_str(&indent);
                    out.push_str(&"#".repeat(level.get() as usize));
                    out.push(' ');
                    out.push_str(&text);
                }
                RichTextKind::BulletListItem => {
                    out.push_str(&indent);
                    out.push_str("- ");
                    out.push_str(&text);
                }
                RichTextKind::NumberedListItem => {
                    out.push_str(&indent);
                    out.push_str("1. ");
                    out.push_str(&text);
                }
            }
        }
        BlockKind::Embed(Embed::Snippet { code, language }) => {
            out.push_str(&indent);
            out.push_str("```");
            out.push_str(language);
            out.push('\n');
            for line in code.lines() {
                out.push_str(&indent);
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&indent);
            out.push_str("```");
        }
        BlockKind::Embed(Embed::Video { url }) => {
            out.push_str(&indent);
            out.push_str(&format!("[Video]({url})"));
        }
        BlockKind::Embed(Embed::Provider(url)) => {
            out.push_str(&indent);
            out.push_str(&format!("[{}]({url})", url.provider()));
        }
    }

    for child in &block.children {
        out.push('\n');
        write_block(out, child, depth + 1);
    }
}

fn inline_to_markdown(content: &[InlineContent]) -> String {
    content
        .iter()
        .map(|node| match node {
            InlineContent::Text(run) => run_to_markdown(run),
            InlineContent::Link { href, content } => {
                let label: String = content.iter().map(run_to_markdown).collect();
                format!("[{label}]({href})")
            }
        })
        .collect()
}

fn run_to_markdown(run: &StyledText) -> String {
    if run.text.is_empty() {
        return String::new();
    }

    let styles = &run.styles;
    let mut text = if styles.code {
        format!("`{}`", run.text)
    } else {
        run.text.clone()
    };
    if styles.strike {
        text = format!("~~{text}~~");
    }
    if styles.italic {
        text = format!("*{text}*");
    }
    if styles.bold {
        text = format!("**{text}**");
    }
    text
}
