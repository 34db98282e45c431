//! Case-insensitive text helpers with char-accurate offsets.
//!
//! Lowercasing can change byte lengths (and occasionally char counts), so
//! positions found in the folded text are mapped back to the original text
//! before anything is sliced out of it.

/// Marker placed where an excerpt was clipped.
pub const ELLIPSIS: &str = "...";

/// A lowercased view of a text that remembers where each folded byte came from.
pub struct FoldedText<'a> {
    original: &'a str,
    lower: String,
    /// `origin[i]` is the byte offset in `original` of the char that produced
    /// byte `i` of `lower`. One extra trailing entry maps the end.
    origin: Vec<usize>,
}

impl<'a> FoldedText<'a> {
    pub fn new(original: &'a str) -> Self {
        let mut lower = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);
        for (offset, ch) in original.char_indices() {
            for lc in ch.to_lowercase() {
                let before = lower.len();
                lower.push(lc);
                origin.extend(std::iter::repeat(offset).take(lower.len() - before));
            }
        }
        origin.push(original.len());
        Self {
            original,
            lower,
            origin,
        }
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// `needle` must already be lowercase.
    pub fn contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.lower.contains(needle)
    }

    /// Byte range in the original text of the first occurrence of `needle`.
    ///
    /// `needle` must already be lowercase.
    pub fn find(&self, needle: &str) -> Option<(usize, usize)> {
        if needle.is_empty() {
            return None;
        }
        let pos = self.lower.find(needle)?;
        let start = self.origin[pos];
        let end = self.origin[pos + needle.len()];
        Some((start, end.max(start)))
    }
}

/// Slice `radius` chars either side of `text[start..end]`, marking clipped
/// edges with [`ELLIPSIS`].
pub fn excerpt(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut out = String::with_capacity(to - from + 2 * ELLIPSIS.len());
    if from > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(&text[from..to]);
    if to < text.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// The excerpt body without clipping markers or surrounding whitespace.
pub fn strip_ellipsis(snippet: &str) -> &str {
    let s = snippet.trim();
    let s = s.strip_prefix(ELLIPSIS).unwrap_or(s);
    let s = s.strip_suffix(ELLIPSIS).unwrap_or(s);
    s.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_maps_back_to_original() {
        let text = "Reset Your PASSWORD now";
        let folded = FoldedText::new(text);
        let (s, e) = folded.find("password").unwrap();
        assert_eq!(&text[s..e], "PASSWORD");
        assert!(folded.contains("your"));
        assert!(!folded.contains("email"));
        assert!(folded.find("").is_none());
    }

    #[test]
    fn test_find_with_multibyte_prefix() {
        let text = "Ünïcödé Straße: VPN setup";
        let folded = FoldedText::new(text);
        let (s, e) = folded.find("vpn").unwrap();
        assert_eq!(&text[s..e], "VPN");
    }

    #[test]
    fn test_excerpt_no_clipping() {
        let text = "short text";
        assert_eq!(excerpt(text, 6, 10, 200), "short text");
    }

    #[test]
    fn test_excerpt_clips_both_sides() {
        let text = "aaaaaaaaaa MATCH bbbbbbbbbb";
        let s = text.find("MATCH").unwrap();
        let out = excerpt(text, s, s + 5, 3);
        assert_eq!(out, "...aa MATCH bb...");
    }

    #[test]
    fn test_excerpt_counts_chars_not_bytes() {
        let text = "ééééé x ééééé";
        let s = text.find('x').unwrap();
        let out = excerpt(text, s, s + 1, 2);
        assert_eq!(out, "...é x é...");
    }

    #[test]
    fn test_strip_ellipsis() {
        assert_eq!(strip_ellipsis("...core text..."), "core text");
        assert_eq!(strip_ellipsis("  plain "), "plain");
    }
}
