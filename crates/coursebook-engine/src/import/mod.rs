//! Conversion of pasted Markdown into chapter blocks.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::embed::{EmbedProvider, EmbedUrl, extract_src_from_iframe};
use crate::models::inline::plain_text;
use crate::models::{
    Block, BlockKind, Embed, HeadingLevel, InlineContent, RichTextKind, StyledText, Styles,
};

/// Parse Markdown into a list of blocks with fresh ids.
///
/// HTML is only kept when it is an iframe pointing at a supported embed
/// provider; any other markup is dropped.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(markdown, options) {
        builder.push(event);
    }
    builder.finish()
}

enum ParagraphTarget {
    Item,
    Block,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    items: Vec<Block>,
    lists: Vec<bool>,
    inline: Vec<InlineContent>,
    link: Option<(String, Vec<StyledText>)>,
    paragraph: Option<ParagraphTarget>,
    /// The open paragraph was cut by an inline embed
    split: bool,
    heading: bool,
    /// Embeds found inside a heading, emitted after it
    trailing: Vec<Block>,
    code: Option<(String, String)>,
    html: Option<String>,
    strong: usize,
    emphasis: usize,
    strikethrough: usize,
}

impl BlockBuilder {
    fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push_str(&text);
                } else if let Some(html) = self.html.as_mut() {
                    html.push_str(&text);
                } else {
                    self.push_run(&text, false);
                }
            }
            Event::Code(text) => self.push_run(&text, true),
            Event::Html(html) => {
                if let Some(buffer) = self.html.as_mut() {
                    buffer.push_str(&html);
                } else if let Some(block) = embed_from_html(&html) {
                    self.emit(block);
                }
            }
            Event::InlineHtml(html) => self.inline_embed(&html),
            Event::SoftBreak => self.push_run(" ", false),
            Event::HardBreak => self.push_run("\n", false),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                self.split = false;
                let opens_item = self.inline.is_empty()
                    && self.items.last().is_some_and(|item| item.content().is_empty());
                if opens_item {
                    self.paragraph = Some(ParagraphTarget::Item);
                } else {
                    self.flush_item_text();
                    self.paragraph = Some(ParagraphTarget::Block);
                }
            }
            Tag::Heading { .. } => {
                self.flush_item_text();
                self.heading = true;
            }
            Tag::List(start) => {
                self.flush_item_text();
                self.lists.push(start.is_some());
            }
            Tag::Item => {
                self.flush_item_text();
                let kind = if self.lists.last().copied().unwrap_or(false) {
                    RichTextKind::NumberedListItem
                } else {
                    RichTextKind::BulletListItem
                };
                self.items.push(Block::rich_text(kind, Vec::new()));
            }
            Tag::CodeBlock(kind) => {
                self.flush_item_text();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((language, String::new()));
            }
            Tag::HtmlBlock => {
                self.flush_item_text();
                self.html = Some(String::new());
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link { dest_url, .. } => self.link = Some((dest_url.to_string(), Vec::new())),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => match self.paragraph.take() {
                Some(ParagraphTarget::Item) => self.flush_item_text(),
                _ => {
                    let content = std::mem::take(&mut self.inline);
                    let leftover = self.split && plain_text(&content).trim().is_empty();
                    if !leftover {
                        self.emit(Block::rich_text(RichTextKind::Paragraph, content));
                    }
                }
            },
            TagEnd::Heading(level) => {
                self.heading = false;
                let content = std::mem::take(&mut self.inline);
                let level = HeadingLevel::clamped(level as u8);
                self.emit(Block::rich_text(RichTextKind::Heading(level), content));
                self.emit_trailing();
            }
            TagEnd::Item => {
                self.flush_item_text();
                if let Some(item) = self.items.pop() {
                    self.emit(item);
                }
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::CodeBlock => {
                if let Some((language, mut code)) = self.code.take() {
                    if code.ends_with('\n') {
                        code.pop();
                    }
                    self.emit(Block::embed(Embed::Snippet { code, language }));
                }
            }
            TagEnd::HtmlBlock => {
                if let Some(block) = self.html.take().as_deref().and_then(embed_from_html) {
                    self.emit(block);
                }
            }
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            TagEnd::Link => {
                if let Some((href, content)) = self.link.take() {
                    self.inline.push(InlineContent::Link { href, content });
                }
            }
            _ => {}
        }
    }

    fn push_run(&mut self, text: &str, code: bool) {
        let styles = Styles {
            bold: self.strong > 0,
            italic: self.emphasis > 0,
            strike: self.strikethrough > 0,
            code,
            ..Styles::default()
        };

        if let Some((_, runs)) = self.link.as_mut() {
            match runs.last_mut() {
                Some(last) if last.styles == styles => last.text.push_str(text),
                _ => runs.push(StyledText::styled(text, styles)),
            }
            return;
        }

        match self.inline.last_mut() {
            Some(InlineContent::Text(last)) if last.styles == styles => last.text.push_str(text),
            _ => self
                .inline
                .push(InlineContent::Text(StyledText::styled(text, styles))),
        }
    }

    /// Embed an iframe met in running text, keeping document order
    fn inline_embed(&mut self, html: &str) {
        let Some(block) = embed_from_html(html) else {
            return;
        };
        match self.paragraph {
            Some(ParagraphTarget::Block) => {
                if !self.inline.is_empty() {
                    let content = std::mem::take(&mut self.inline);
                    self.emit(Block::rich_text(RichTextKind::Paragraph, content));
                }
                self.split = true;
                self.emit(block);
            }
            None if self.heading => self.trailing.push(block),
            Some(ParagraphTarget::Item) | None => {
                self.flush_item_text();
                self.emit(block);
            }
        }
    }

    fn emit_trailing(&mut self) {
        for block in std::mem::take(&mut self.trailing) {
            self.emit(block);
        }
    }

    /// Move loose inline text into the innermost open list item
    fn flush_item_text(&mut self) {
        if self.inline.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.inline);
        match self.items.last_mut() {
            Some(Block {
                kind: BlockKind::RichText { content: existing, .. },
                ..
            }) if existing.is_empty() => *existing = content,
            Some(item) => item
                .children
                .push(Block::rich_text(RichTextKind::Paragraph, content)),
            None => self
                .blocks
                .push(Block::rich_text(RichTextKind::Paragraph, content)),
        }
    }

    fn emit(&mut self, block: Block) {
        match self.items.last_mut() {
            Some(item) => item.children.push(block),
            None => self.blocks.push(block),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_item_text();
        self.emit_trailing();
        while let Some(item) = self.items.pop() {
            self.emit(item);
        }
        assign_positions(&mut self.blocks);
        self.blocks
    }
}

fn embed_from_html(html: &str) -> Option<Block> {
    let Some(src) = extract_src_from_iframe(html) else {
        log::debug!("Dropping HTML without an embeddable src");
        return None;
    };
    match EmbedProvider::detect(&src).map(|provider| EmbedUrl::parse(provider, &src)) {
        Some(Ok(url)) => Some(Block::embed(Embed::Provider(url))),
        _ => {
            log::debug!("Dropping iframe with unsupported src: {src}");
            None
        }
    }
}

fn assign_positions(blocks: &mut [Block]) {
    for (index, block) in blocks.iter_mut().enumerate() {
        block.position = u32::try_from(index).unwrap_or(u32::MAX);
        assign_positions(&mut block.children);
    }
}
