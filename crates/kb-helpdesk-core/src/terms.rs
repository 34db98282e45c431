//! Query term extraction.
//!
//! A raw query is reduced to the significant lowercase terms used for
//! scoring: punctuation is stripped, tokens of two characters or fewer and
//! stopwords are dropped. "Technical terms" (hyphenated tokens, acronyms and
//! capitalised product-style names) are detected on the raw query, kept in a
//! separate list because they carry extra weight, and unioned into the term
//! set.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

/// The closed stopword list applied when none is configured.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "with", "about", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "can",
    "could", "will", "would", "should", "may", "might", "must", "tell", "me",
];

/// A set of lowercase words ignored during term extraction.
#[derive(Debug, Clone)]
pub struct Stopwords(HashSet<String>);

impl Stopwords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(word)
    }
}

impl Default for Stopwords {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWORDS)
    }
}

/// Significant terms of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryTerms {
    /// Keywords followed by any technical terms not already present.
    pub terms: Vec<String>,
    /// Lowercased technical terms, a subset of `terms`.
    pub technical: Vec<String>,
    /// Space-joined keywords in query order, used for exact-phrase checks.
    pub phrase: String,
}

impl QueryTerms {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }
}

fn hyphenated_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z0-9]+(?:-[A-Za-z0-9]+)+\b").expect("valid regex"))
}

fn acronym_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]{2,}[0-9]*\b").expect("valid regex"))
}

fn capitalized_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+(?:-[0-9]+)?\b").expect("valid regex"))
}

/// Extracts [`QueryTerms`] from raw queries.
#[derive(Debug, Clone, Default)]
pub struct TermExtractor {
    stopwords: Stopwords,
}

impl TermExtractor {
    pub fn new(stopwords: Stopwords) -> Self {
        Self { stopwords }
    }

    pub fn stopwords(&self) -> &Stopwords {
        &self.stopwords
    }

    pub fn extract(&self, query: &str) -> QueryTerms {
        let keywords = self.keywords(query);
        let technical = self.technical_terms(query);
        let phrase = keywords.join(" ");

        let mut terms = keywords;
        for t in &technical {
            if !terms.contains(t) {
                terms.push(t.clone());
            }
        }

        QueryTerms {
            terms,
            technical,
            phrase,
        }
    }

    /// Lowercase, punctuation-free, stopword-filtered tokens longer than two chars.
    pub fn keywords(&self, query: &str) -> Vec<String> {
        let cleaned: String = query
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
            .collect();

        let mut out: Vec<String> = Vec::new();
        for word in cleaned.split_whitespace() {
            if word.chars().count() <= 2 || self.stopwords.contains(word) {
                continue;
            }
            if !out.iter().any(|w| w == word) {
                out.push(word.to_string());
            }
        }
        out
    }

    /// Hyphenated tokens, acronyms and capitalised names, lowercased.
    ///
    /// A capitalised word at the start of a sentence is ordinary prose, not a
    /// name, and is skipped. Like keywords, terms of two chars or fewer are
    /// dropped: scoring matches substrings, so `pc` would hit "specific".
    pub fn technical_terms(&self, query: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        let mut push = |raw: &str| {
            let t = raw.to_lowercase();
            if t.chars().count() > 2 && !self.stopwords.contains(&t) && !found.contains(&t) {
                found.push(t);
            }
        };

        for m in hyphenated_re().find_iter(query) {
            push(m.as_str());
        }
        for m in acronym_re().find_iter(query) {
            push(m.as_str());
        }
        for m in capitalized_re().find_iter(query) {
            let before = query[..m.start()].trim_end();
            let sentence_start = before.is_empty() || before.ends_with(['.', '!', '?']);
            if !sentence_start {
                push(m.as_str());
            }
        }
        found
    }
}
