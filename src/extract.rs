//! HTML to plain-text extraction for crawled pages.
//!
//! Extraction is regex-driven and deliberately forgiving: it never fails on
//! malformed markup, it just yields less text. Boilerplate containers
//! (`script`, `style`, `nav`, `footer`, `header`, `aside`, `iframe`,
//! `noscript`) are removed, `<main>` or `<article>` content is preferred over
//! the whole `<body>`, block-level tags become line breaks and entities are
//! decoded.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const MIME_HTML: &str = "text/html";
pub const MIME_XHTML: &str = "application/xhtml+xml";
pub const MIME_TEXT: &str = "text/plain";

/// Title used when a page has none.
pub const UNTITLED: &str = "Untitled";

const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
}

/// Title and body text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub body: String,
}

/// Extract a page from a response body, dispatching on its content type.
///
/// `content_type` may carry parameters (`text/html; charset=utf-8`); a
/// missing content type is treated as HTML.
pub fn extract_page(bytes: &[u8], content_type: Option<&str>) -> Result<ExtractedPage, ExtractError> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_else(|| MIME_HTML.to_string());
    let text = String::from_utf8_lossy(bytes);

    match mime.as_str() {
        MIME_HTML | MIME_XHTML => Ok(extract_html(&text)),
        MIME_TEXT => Ok(ExtractedPage {
            title: UNTITLED.to_string(),
            body: normalize_whitespace(&text),
        }),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

pub fn extract_html(html: &str) -> ExtractedPage {
    let title = title_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse_inline(&decode_entities(&strip_tags(m.as_str()))))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let mut cleaned = comment_re().replace_all(html, "").into_owned();
    cleaned = head_re().replace_all(&cleaned, "").into_owned();
    for re in removed_res() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }

    let content = main_content(&cleaned);
    let with_breaks = block_re().replace_all(content, "\n");
    let text = decode_entities(&strip_tags(&with_breaks));

    ExtractedPage {
        title,
        body: normalize_whitespace(&text),
    }
}

fn main_content(html: &str) -> &str {
    for re in [main_re(), article_re(), body_re()] {
        if let Some(m) = re.captures(html).and_then(|c| c.get(1)) {
            if !m.as_str().trim().is_empty() {
                return m.as_str();
            }
        }
    }
    html
}

fn strip_tags(html: &str) -> String {
    tag_re().replace_all(html, "").into_owned()
}

/// Decode the named entities that matter for prose plus numeric references.
pub fn decode_entities(text: &str) -> String {
    entity_re()
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" => Some('\u{2013}'),
                    "mdash" => Some('\u{2014}'),
                    "rsquo" => Some('\u{2019}'),
                    "lsquo" => Some('\u{2018}'),
                    "hellip" => Some('\u{2026}'),
                    "copy" => Some('\u{a9}'),
                    _ => None,
                }
            };
            decoded
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Collapse runs of spaces within lines and drop blank lines.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(collapse_inline)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("valid regex"))
        }
    };
}

cached_regex!(title_re, r"(?is)<title\b[^>]*>(.*?)</title\s*>");
cached_regex!(comment_re, r"(?s)<!--.*?-->");
cached_regex!(head_re, r"(?is)<head\b[^>]*>.*?</head\s*>");
cached_regex!(main_re, r"(?is)<main\b[^>]*>(.*)</main\s*>");
cached_regex!(article_re, r"(?is)<article\b[^>]*>(.*)</article\s*>");
cached_regex!(body_re, r"(?is)<body\b[^>]*>(.*)</body\s*>");
cached_regex!(
    block_re,
    r"(?i)</?(?:p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|section|blockquote|pre|dd|dt)\b[^>]*>"
);
cached_regex!(tag_re, r"(?s)<[^>]*>");
cached_regex!(entity_re, r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});");

fn removed_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        REMOVED_ELEMENTS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid regex")
            })
            .collect()
    })
}
