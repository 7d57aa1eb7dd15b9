//! Validation of third-party embed URLs.
//!
//! Creators paste either a URL or a whole `<iframe>` snippet into an embed
//! block. Only URLs matching the canonical embed shape of a supported provider
//! are accepted, so no arbitrary third-party HTML ever reaches a chapter.
//!
//! All predicates here are total: malformed input yields `false`, never a panic.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EmbedError {
    #[error("Invalid {provider} embed URL: {url}")]
    InvalidUrl { provider: EmbedProvider, url: String },
    #[error("No src attribute found in embed code")]
    MissingSrc,
}

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("Invalid embed regex"))
}

pub fn is_valid_code_sandbox_embed_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^https://codesandbox\.io/embed/[A-Za-z0-9_-]+(\?.*)?$").is_match(url)
}

pub fn is_valid_stack_blitz_embed_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^https://stackblitz\.com/edit/[A-Za-z0-9_-]+(\?.*)?$").is_match(url)
}

pub fn is_valid_figma_embed_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"^https://www\.figma\.com/embed\?embed_host=[A-Za-z0-9_-]+&url=[^\s&]+(&.*)?$",
    )
    .is_match(url)
}

pub fn is_valid_codepen_embed_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"^https://codepen\.io/[A-Za-z0-9_-]+/embed/(preview/)?[A-Za-z0-9]+(\?.*)?$",
    )
    .is_match(url)
}

/// Accepts both `/embed/<id>` and `/watch?v=<id>`, optionally followed by
/// further query parameters.
pub fn is_valid_youtube_embed_url(url: &str) -> bool {
    youtube_video_id(url).is_some()
}

pub fn is_valid_replit_embed_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"^https://replit\.com/@[A-Za-z0-9_-]+/[A-Za-z0-9_.-]+(\?.*)?$",
    )
    .is_match(url)
}

fn youtube_video_id(url: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = compiled(
        &RE,
        r"^https://www\.youtube\.com/(?:embed/(?P<embed>[A-Za-z0-9_-]+)(?:\?.*)?|watch\?v=(?P<watch>[A-Za-z0-9_-]+)(?:&.*)?)$",
    );
    let caps = re.captures(url)?;
    caps.name("embed")
        .or_else(|| caps.name("watch"))
        .map(|m| m.as_str())
}

/// Extract the first `src` attribute value from a pasted iframe snippet.
pub fn extract_src_from_iframe(code: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = compiled(&RE, r#"src\s*=\s*(?:"([^"]*)"|'([^']*)')"#);
    let caps = re.captures(code)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|src| !src.is_empty())
}

/// Third-party providers whose embeds may be placed in a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmbedProvider {
    CodeSandbox,
    StackBlitz,
    Figma,
    CodePen,
    YouTube,
    Replit,
}

impl EmbedProvider {
    pub const ALL: [EmbedProvider; 6] = [
        EmbedProvider::CodeSandbox,
        EmbedProvider::StackBlitz,
        EmbedProvider::Figma,
        EmbedProvider::CodePen,
        EmbedProvider::YouTube,
        EmbedProvider::Replit,
    ];

    pub fn validate(self, url: &str) -> bool {
        match self {
            EmbedProvider::CodeSandbox => is_valid_code_sandbox_embed_url(url),
            EmbedProvider::StackBlitz => is_valid_stack_blitz_embed_url(url),
            EmbedProvider::Figma => is_valid_figma_embed_url(url),
            EmbedProvider::CodePen => is_valid_codepen_embed_url(url),
            EmbedProvider::YouTube => is_valid_youtube_embed_url(url),
            EmbedProvider::Replit => is_valid_replit_embed_url(url),
        }
    }

    /// First provider whose embed shape matches `url`
    pub fn detect(url: &str) -> Option<EmbedProvider> {
        Self::ALL.into_iter().find(|provider| provider.validate(url))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EmbedProvider::CodeSandbox => "CodeSandbox",
            EmbedProvider::StackBlitz => "StackBlitz",
            EmbedProvider::Figma => "Figma",
            EmbedProvider::CodePen => "CodePen",
            EmbedProvider::YouTube => "YouTube",
            EmbedProvider::Replit => "Replit",
        }
    }

    /// Lower-case name accepted on the command line
    pub fn from_name(name: &str) -> Option<EmbedProvider> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.display_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EmbedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// An embed URL that passed its provider's validator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbedUrl {
    provider: EmbedProvider,
    url: String,
}

impl EmbedUrl {
    /// Validate `raw` for `provider`.
    ///
    /// YouTube watch URLs are rewritten to the `/embed/<id>` form so every
    /// stored YouTube URL can be dropped straight into an iframe.
    pub fn parse(provider: EmbedProvider, raw: &str) -> Result<Self, EmbedError> {
        let trimmed = raw.trim();
        if !provider.validate(trimmed) {
            return Err(EmbedError::InvalidUrl {
                provider,
                url: raw.to_string(),
            });
        }

        let url = match provider {
            EmbedProvider::YouTube if trimmed.contains("/watch?") => match youtube_video_id(trimmed) {
                Some(id) => format!("https://www.youtube.com/embed/{id}"),
                None => trimmed.to_string(),
            },
            _ => trimmed.to_string(),
        };

        Ok(Self { provider, url })
    }

    /// Validate the `src` of a pasted iframe snippet
    pub fn from_iframe(provider: EmbedProvider, code: &str) -> Result<Self, EmbedError> {
        let src = extract_src_from_iframe(code).ok_or(EmbedError::MissingSrc)?;
        Self::parse(provider, &src)
    }

    pub fn provider(&self) -> EmbedProvider {
        self.provider
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for EmbedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://www.youtube.com/embed/abc123", true)]
    #[case("https://www.youtube.com/watch?v=abc123", true)]
    #[case("https://www.youtube.com/embed/abc123?start=30", true)]
    #[case("https://www.youtube.com/watch?v=abc123&t=42s", true)]
    #[case("https://vimeo.com/123", false)]
    #[case("https://www.youtube.com/embed/", false)]
    #[case("https://www.youtube.com/watch?v=", false)]
    #[case("http://www.youtube.com/embed/abc123", false)]
    #[case("https://WWW.YOUTUBE.COM/embed/abc123", false)]
    #[case("", false)]
    fn youtube_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_valid_youtube_embed_url(url), expected);
    }

    #[rstest]
    #[case("https://codesandbox.io/embed/abc123", true)]
    #[case("https://codesandbox.io/embed/new-sandbox-x2z?fontsize=14&hidenavigation=1", true)]
    #[case("https://codesandbox.io/s/abc123", false)]
    #[case("https://codesandbox.io/embed/", false)]
    #[case("codesandbox.io/embed/abc123", false)]
    fn code_sandbox_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_valid_code_sandbox_embed_url(url), expected);
    }

    #[rstest]
    #[case("https://stackblitz.com/edit/vitejs-vite-abc?embed=1&file=index.html", true)]
    #[case("https://stackblitz.com/edit/angular", true)]
    #[case("https://stackblitz.com/github/user/repo", false)]
    #[case("https://stackblitz.com/edit/", false)]
    fn stack_blitz_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_valid_stack_blitz_embed_url(url), expected);
    }

    #[rstest]
    #[case(
        "https://www.figma.com/embed?embed_host=share&url=https%3A%2F%2Fwww.figma.com%2Ffile%2Fabc",
        true
    )]
    #[case("https://www.figma.com/file/abc/Design", false)]
    #[case("https://www.figma.com/embed?embed_host=share", false)]
    fn figma_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_valid_figma_embed_url(url), expected);
    }

    #[rstest]
    #[case("https://codepen.io/team/embed/abcDEF", true)]
    #[case("https://codepen.io/some-user/embed/preview/xyz123?default-tab=result", true)]
    #[case("https://codepen.io/some-user/pen/xyz123", false)]
    fn codepen_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_valid_codepen_embed_url(url), expected);
    }

    #[rstest]
    #[case("https://replit.com/@someone/my-repl?embed=true", true)]
    #[case("https://replit.com/@someone/hello.py", true)]
    #[case("https://replit.com/someone/my-repl", false)]
    #[case("https://repl.it/@someone/my-repl", false)]
    fn replit_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_valid_replit_embed_url(url), expected);
    }

    #[test]
    fn extracts_src_from_iframe() {
        assert_eq!(
            extract_src_from_iframe(r#"<iframe src="https://x.com/a"></iframe>"#),
            Some("https://x.com/a".to_string())
        );
        assert_eq!(
            extract_src_from_iframe(
                r#"<iframe width="560" src='https://www.youtube.com/embed/q1' allowfullscreen></iframe>"#
            ),
            Some("https://www.youtube.com/embed/q1".to_string())
        );
    }

    #[test]
    fn extract_src_takes_first_match() {
        let code = r#"<iframe src="https://first.example"></iframe><iframe src="https://second.example"></iframe>"#;
        assert_eq!(
            extract_src_from_iframe(code),
            Some("https://first.example".to_string())
        );
    }

    #[test]
    fn extract_src_without_src_is_none() {
        assert_eq!(extract_src_from_iframe("<div>no iframe</div>"), None);
        assert_eq!(extract_src_from_iframe(r#"<iframe src=""></iframe>"#), None);
        assert_eq!(extract_src_from_iframe(""), None);
    }

    #[test]
    fn detect_provider() {
        assert_eq!(
            EmbedProvider::detect("https://www.youtube.com/watch?v=abc"),
            Some(EmbedProvider::YouTube)
        );
        assert_eq!(
            EmbedProvider::detect("https://codepen.io/a/embed/b"),
            Some(EmbedProvider::CodePen)
        );
        assert_eq!(EmbedProvider::detect("https://example.com"), None);
    }

    #[test]
    fn provider_names_round_trip() {
        for provider in EmbedProvider::ALL {
            assert_eq!(
                EmbedProvider::from_name(&provider.display_name().to_lowercase()),
                Some(provider)
            );
        }
        assert_eq!(EmbedProvider::from_name("vimeo"), None);
    }

    #[test]
    fn parse_normalizes_youtube_watch_urls() {
        let url = EmbedUrl::parse(
            EmbedProvider::YouTube,
            " https://www.youtube.com/watch?v=abc123&t=5s ",
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://www.youtube.com/embed/abc123");
        assert_eq!(url.provider(), EmbedProvider::YouTube);
    }

    #[test]
    fn parse_rejects_wrong_provider() {
        let err = EmbedUrl::parse(EmbedProvider::Figma, "https://codesandbox.io/embed/abc").unwrap_err();
        assert_eq!(
            err,
            EmbedError::InvalidUrl {
                provider: EmbedProvider::Figma,
                url: "https://codesandbox.io/embed/abc".to_string(),
            }
        );
    }

    #[test]
    fn from_iframe_requires_src() {
        assert_eq!(
            EmbedUrl::from_iframe(EmbedProvider::CodeSandbox, "<iframe></iframe>"),
            Err(EmbedError::MissingSrc)
        );
        let url = EmbedUrl::from_iframe(
            EmbedProvider::CodeSandbox,
            r#"<iframe src="https://codesandbox.io/embed/abc"></iframe>"#,
        )
        .unwrap();
        assert_eq!(url.to_string(), "https://codesandbox.io/embed/abc");
    }
}
