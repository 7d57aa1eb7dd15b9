use serde::{Deserialize, Serialize};

/// Formatting marks carried by a run of text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Styles {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    /// CSS color name or hex for the text itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    /// CSS color name or hex for the highlight behind the text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Styles {
    pub fn is_plain(&self) -> bool {
        *self == Styles::default()
    }
}

/// A run of text sharing one set of styles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledText {
    pub text: String,
    #[serde(default)]
    pub styles: Styles,
}

impl StyledText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            styles: Styles::default(),
        }
    }

    pub fn styled(text: impl Into<String>, styles: Styles) -> Self {
        Self {
            text: text.into(),
            styles,
        }
    }
}

/// Inline content node of a rich-text block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InlineContent {
    Text(StyledText),
    Link {
        href: String,
        #[serde(default)]
        content: Vec<StyledText>,
    },
}

impl InlineContent {
    pub fn text(text: impl Into<String>) -> Self {
        InlineContent::Text(StyledText::plain(text))
    }

    pub fn link(href: impl Into<String>, text: impl Into<String>) -> Self {
        InlineContent::Link {
            href: href.into(),
            content: vec![StyledText::plain(text)],
        }
    }

    /// Concatenated text of this node without any markup
    pub fn plain_text(&self) -> String {
        match self {
            InlineContent::Text(run) => run.text.clone(),
            InlineContent::Link { content, .. } => {
                content.iter().map(|run| run.text.as_str()).collect()
            }
        }
    }
}

/// Concatenated plain text of a sequence of inline nodes
pub fn plain_text(content: &[InlineContent]) -> String {
    content.iter().map(InlineContent::plain_text).collect()
}
