//! Typed chapter blocks and their JSON wire format.
//!
//! On the wire a block is a loosely typed record (`type` tag, string `props`,
//! inline `content`). In memory every kind carries only its own fields, and
//! embed URLs are validated while the block is built.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embed::{EmbedError, EmbedProvider, EmbedUrl};
use crate::models::chapter::ChapterId;
use crate::models::inline::{InlineContent, plain_text};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("Unknown block type: {0}")]
    UnknownType(String),
    #[error("Block {block_type} is missing required prop `{prop}`")]
    MissingProp {
        block_type: BlockType,
        prop: &'static str,
    },
    #[error("Invalid heading level: {0}")]
    InvalidHeadingLevel(String),
    #[error("Invalid text alignment: {0}")]
    InvalidTextAlignment(String),
    #[error("Block {block_type} does not accept prop `{prop}`")]
    UnknownProp { block_type: BlockType, prop: String },
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Stable identifier of a block across edits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The closed set of block type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Paragraph,
    Heading,
    BulletListItem,
    NumberedListItem,
    Video,
    CodeSandBox,
    Figma,
    StackBlitz,
    Snippet,
    Codepen,
    Youtube,
    Replit,
}

impl BlockType {
    pub const ALL: [BlockType; 12] = [
        BlockType::Paragraph,
        BlockType::Heading,
        BlockType::BulletListItem,
        BlockType::NumberedListItem,
        BlockType::Video,
        BlockType::CodeSandBox,
        BlockType::Figma,
        BlockType::StackBlitz,
        BlockType::Snippet,
        BlockType::Codepen,
        BlockType::Youtube,
        BlockType::Replit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::BulletListItem => "bulletListItem",
            BlockType::NumberedListItem => "numberedListItem",
            BlockType::Video => "video",
            BlockType::CodeSandBox => "codeSandBox",
            BlockType::Figma => "figma",
            BlockType::StackBlitz => "stackBlitz",
            BlockType::Snippet => "snippet",
            BlockType::Codepen => "codepen",
            BlockType::Youtube => "youtube",
            BlockType::Replit => "replit",
        }
    }

    pub fn is_rich_text(self) -> bool {
        matches!(
            self,
            BlockType::Paragraph
                | BlockType::Heading
                | BlockType::BulletListItem
                | BlockType::NumberedListItem
        )
    }

    /// Provider whose validator gates this block's URL, if any
    pub fn embed_provider(self) -> Option<EmbedProvider> {
        match self {
            BlockType::CodeSandBox => Some(EmbedProvider::CodeSandbox),
            BlockType::Figma => Some(EmbedProvider::Figma),
            BlockType::StackBlitz => Some(EmbedProvider::StackBlitz),
            BlockType::Codepen => Some(EmbedProvider::CodePen),
            BlockType::Youtube => Some(EmbedProvider::YouTube),
            BlockType::Replit => Some(EmbedProvider::Replit),
            _ => None,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BlockError::UnknownType(s.to_string()))
    }
}

/// Whether a raw `type` tag names a rich-text block.
///
/// Unrecognized tags are not rich text, so a newly added embed kind never
/// gets routed to HTML rendering by accident.
pub fn is_rich_text_block(block_type: &str) -> bool {
    block_type
        .parse::<BlockType>()
        .is_ok_and(BlockType::is_rich_text)
}

/// Heading level, 1 to 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    pub const MAX: u8 = 3;

    pub fn new(level: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&level).then_some(Self(level))
    }

    /// Clamp any level into the supported range
    pub fn clamped(level: u8) -> Self {
        Self(level.clamp(1, Self::MAX))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for HeadingLevel {
    fn default() -> Self {
        Self(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            TextAlignment::Left => "left",
            TextAlignment::Center => "center",
            TextAlignment::Right => "right",
            TextAlignment::Justify => "justify",
        }
    }
}

impl FromStr for TextAlignment {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(TextAlignment::Left),
            "center" => Ok(TextAlignment::Center),
            "right" => Ok(TextAlignment::Right),
            "justify" => Ok(TextAlignment::Justify),
            other => Err(BlockError::InvalidTextAlignment(other.to_string())),
        }
    }
}

/// Editor presentation props any block may carry.
///
/// Colors are editor palette names (`"default"`, `"red"`, ...) and are kept
/// verbatim; `None` means the prop was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Appearance {
    pub text_color: Option<String>,
    pub background_color: Option<String>,
    pub text_alignment: Option<TextAlignment>,
}

impl Appearance {
    const PROPS: [&'static str; 3] = ["textColor", "backgroundColor", "textAlignment"];

    fn from_props(props: &BTreeMap<String, String>) -> Result<Self, BlockError> {
        Ok(Self {
            text_color: props.get("textColor").cloned(),
            background_color: props.get("backgroundColor").cloned(),
            text_alignment: props
                .get("textAlignment")
                .map(|value| value.parse())
                .transpose()?,
        })
    }

    fn write_props(self, props: &mut BTreeMap<String, String>) {
        if let Some(color) = self.text_color {
            props.insert("textColor".to_string(), color);
        }
        if let Some(color) = self.background_color {
            props.insert("backgroundColor".to_string(), color);
        }
        if let Some(alignment) = self.text_alignment {
            props.insert("textAlignment".to_string(), alignment.as_str().to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RichTextKind {
    Paragraph,
    Heading(HeadingLevel),
    BulletListItem,
    NumberedListItem,
}

/// Content of an embed block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    /// Uploaded video, addressed by its (signed) delivery URL
    Video { url: String },
    Snippet { code: String, language: String },
    /// Interactive content from a supported third-party provider
    Provider(EmbedUrl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    RichText {
        kind: RichTextKind,
        content: Vec<InlineContent>,
    },
    Embed(Embed),
}

/// The atomic content unit of a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub appearance: Appearance,
    pub children: Vec<Block>,
    /// Ordering key among siblings, re-derived from array order on save
    pub position: u32,
    /// Cached HTML of a rich-text block; always `None` for embeds
    pub html: Option<String>,
    pub chapter_id: Option<ChapterId>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            id: BlockId::generate(),
            kind,
            appearance: Appearance::default(),
            children: Vec::new(),
            position: 0,
            html: None,
            chapter_id: None,
        }
    }

    pub fn rich_text(kind: RichTextKind, content: Vec<InlineContent>) -> Self {
        Self::new(BlockKind::RichText { kind, content })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::rich_text(RichTextKind::Paragraph, vec![InlineContent::text(text)])
    }

    pub fn heading(level: HeadingLevel, text: impl Into<String>) -> Self {
        Self::rich_text(RichTextKind::Heading(level), vec![InlineContent::text(text)])
    }

    pub fn embed(embed: Embed) -> Self {
        Self::new(BlockKind::Embed(embed))
    }

    pub fn with_id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    pub fn block_type(&self) -> BlockType {
        match &self.kind {
            BlockKind::RichText { kind, .. } => match kind {
                RichTextKind::Paragraph => BlockType::Paragraph,
                RichTextKind::Heading(_) => BlockType::Heading,
                RichTextKind::BulletListItem => BlockType::BulletListItem,
                RichTextKind::NumberedListItem => BlockType::NumberedListItem,
            },
            BlockKind::Embed(embed) => match embed {
                Embed::Video { .. } => BlockType::Video,
                Embed::Snippet { .. } => BlockType::Snippet,
                Embed::Provider(url) => match url.provider() {
                    EmbedProvider::CodeSandbox => BlockType::CodeSandBox,
                    EmbedProvider::StackBlitz => BlockType::StackBlitz,
                    EmbedProvider::Figma => BlockType::Figma,
                    EmbedProvider::CodePen => BlockType::Codepen,
                    EmbedProvider::YouTube => BlockType::Youtube,
                    EmbedProvider::Replit => BlockType::Replit,
                },
            },
        }
    }

    pub fn is_rich_text(&self) -> bool {
        is_rich_text_block(self.block_type().as_str())
    }

    /// Inline content of a rich-text block, empty for embeds
    pub fn content(&self) -> &[InlineContent] {
        match &self.kind {
            BlockKind::RichText { content, .. } => content,
            BlockKind::Embed(_) => &[],
        }
    }

    pub fn plain_text(&self) -> String {
        plain_text(self.content())
    }
}

/// Wire representation of a block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    id: BlockId,
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    props: BTreeMap<String, String>,
    #[serde(default)]
    content: Vec<InlineContent>,
    #[serde(default)]
    children: Vec<Block>,
    #[serde(default)]
    position: u32,
    #[serde(default, alias = "_html", skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chapter_id: Option<ChapterId>,
}

fn required_prop(
    props: &BTreeMap<String, String>,
    block_type: BlockType,
    prop: &'static str,
) -> Result<String, BlockError> {
    props
        .get(prop)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or(BlockError::MissingProp { block_type, prop })
}

/// Props a block type reads besides its appearance
fn own_props(block_type: BlockType) -> &'static [&'static str] {
    match block_type {
        BlockType::Paragraph | BlockType::BulletListItem | BlockType::NumberedListItem => &[],
        BlockType::Heading => &["level"],
        BlockType::Snippet => &["code", "language"],
        BlockType::Video
        | BlockType::CodeSandBox
        | BlockType::Figma
        | BlockType::StackBlitz
        | BlockType::Codepen
        | BlockType::Youtube
        | BlockType::Replit => &["url"],
    }
}

impl TryFrom<RawBlock> for Block {
    type Error = BlockError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let block_type: BlockType = raw.block_type.parse()?;
        if let Some(prop) = raw.props.keys().find(|prop| {
            !own_props(block_type).contains(&prop.as_str())
                && !Appearance::PROPS.contains(&prop.as_str())
        }) {
            return Err(BlockError::UnknownProp {
                block_type,
                prop: prop.clone(),
            });
        }
        let appearance = Appearance::from_props(&raw.props)?;

        let rich_text = |kind| BlockKind::RichText {
            kind,
            content: raw.content.clone(),
        };

        let kind = match block_type {
            BlockType::Paragraph => rich_text(RichTextKind::Paragraph),
            BlockType::Heading => {
                let level = match raw.props.get("level") {
                    None => HeadingLevel::default(),
                    Some(value) => value
                        .parse::<u8>()
                        .ok()
                        .and_then(HeadingLevel::new)
                        .ok_or_else(|| BlockError::InvalidHeadingLevel(value.clone()))?,
                };
                rich_text(RichTextKind::Heading(level))
            }
            BlockType::BulletListItem => rich_text(RichTextKind::BulletListItem),
            BlockType::NumberedListItem => rich_text(RichTextKind::NumberedListItem),
            BlockType::Video => BlockKind::Embed(Embed::Video {
                url: required_prop(&raw.props, block_type, "url")?,
            }),
            BlockType::Snippet => BlockKind::Embed(Embed::Snippet {
                code: raw.props.get("code").cloned().unwrap_or_default(),
                language: raw.props.get("language").cloned().unwrap_or_default(),
            }),
            BlockType::CodeSandBox
            | BlockType::Figma
            | BlockType::StackBlitz
            | BlockType::Codepen
            | BlockType::Youtube
            | BlockType::Replit => {
                let url = required_prop(&raw.props, block_type, "url")?;
                let provider = block_type
                    .embed_provider()
                    .ok_or(BlockError::UnknownType(raw.block_type.clone()))?;
                BlockKind::Embed(Embed::Provider(EmbedUrl::parse(provider, &url)?))
            }
        };

        let html = if block_type.is_rich_text() {
            raw.html.filter(|html| !html.is_empty())
        } else {
            None
        };

        Ok(Block {
            id: raw.id,
            kind,
            appearance,
            children: raw.children,
            position: raw.position,
            html,
            chapter_id: raw.chapter_id,
        })
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let block_type = block.block_type().as_str().to_string();
        let mut props = BTreeMap::new();
        let mut content = Vec::new();
        block.appearance.write_props(&mut props);

        match block.kind {
            BlockKind::RichText { kind, content: inline } => {
                if let RichTextKind::Heading(level) = kind {
                    props.insert("level".to_string(), level.get().to_string());
                }
                content = inline;
            }
            BlockKind::Embed(Embed::Video { url }) => {
                props.insert("url".to_string(), url);
            }
            BlockKind::Embed(Embed::Snippet { code, language }) => {
                props.insert("code".to_string(), code);
                props.insert("language".to_string(), language);
            }
            BlockKind::Embed(Embed::Provider(url)) => {
                props.insert("url".to_string(), url.as_str().to_string());
            }
        }

        RawBlock {
            id: block.id,
            block_type,
            props,
            content,
            children: block.children,
            position: block.position,
            html: block.html,
            chapter_id: block.chapter_id,
        }
    }
}
