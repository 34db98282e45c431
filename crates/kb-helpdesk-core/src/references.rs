//! Post-hoc attribution of an answer to the documents it draws from.
//!
//! Language models paraphrase, so exact-substring matching alone
//! under-attributes. Three progressively looser tiers are tried in order and
//! the first non-empty tier wins:
//!
//! 1. **Title**: the title appears verbatim, or enough of its meaningful
//!    words do (see [`Leniency`]).
//! 2. **Content phrases**: 3 to 5 word windows and short sentences from the
//!    candidate's snippet appear verbatim; longer answers need more hits.
//! 3. **Fallback**: a substantial answer with no other match keeps the
//!    top-ranked candidate if it shares significant terms with it.
//!
//! An answer containing a no-information phrase is never attributed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{Reference, SearchResult};
use crate::text::strip_ellipsis;

/// The exact sentence the model is told to use when the context is silent.
pub const NO_INFO_MESSAGE: &str = "I don't have that information in my knowledge base.";

/// Lowercase markers of a negative answer.
pub const NO_INFO_PHRASES: &[&str] = &[
    "don't have that information",
    "do not have that information",
    "don't have information",
    "do not have information",
    "not in my knowledge base",
    "not available in my knowledge base",
    "no information about",
];

/// Small words ignored when comparing titles and building phrases.
const FILTER_STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "from",
    "by", "as", "is", "are", "was", "were", "be", "it", "its", "this", "that", "your", "you",
    "our", "how", "what", "when", "where", "which", "who", "will", "can", "into", "about",
];

const FALLBACK_MIN_ANSWER_CHARS: usize = 100;

/// Whether `answer` is, in effect, "I don't know".
pub fn contains_no_information(answer: &str) -> bool {
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    NO_INFO_PHRASES.iter().any(|p| lower.contains(p))
}

/// How much title-word overlap the first tier demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leniency {
    /// At least one meaningful title word, covering 30% of them.
    #[default]
    Lenient,
    /// At least two meaningful title words, covering 50% of them.
    Strict,
}

impl Leniency {
    fn min_words(self) -> usize {
        match self {
            Leniency::Lenient => 1,
            Leniency::Strict => 2,
        }
    }

    fn min_coverage(self) -> f64 {
        match self {
            Leniency::Lenient => 0.3,
            Leniency::Strict => 0.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferencePolicy {
    pub leniency: Leniency,
}

impl ReferencePolicy {
    /// The subset of `candidates` the answer appears to draw from, in
    /// candidate order and unique by URL.
    pub fn filter(&self, candidates: &[SearchResult], answer: &str) -> Vec<Reference> {
        self.filter_prepared(&PreparedCandidates::new(candidates), answer)
    }

    /// [`filter`](Self::filter) against candidates prepared once, for
    /// re-checking an answer as it grows.
    pub fn filter_prepared(&self, prepared: &PreparedCandidates, answer: &str) -> Vec<Reference> {
        if prepared.is_empty() || answer.trim().is_empty() || contains_no_information(answer) {
            return Vec::new();
        }

        let answer = AnswerText::new(answer);

        let by_title = self.title_matches(prepared, &answer);
        if !by_title.is_empty() {
            return dedup(by_title);
        }

        let by_phrase = phrase_matches(prepared, &answer);
        if !by_phrase.is_empty() {
            return dedup(by_phrase);
        }

        fallback_match(prepared, &answer)
            .map(|c| vec![c.reference.clone()])
            .unwrap_or_default()
    }

    fn title_matches<'a>(
        &self,
        prepared: &'a PreparedCandidates,
        answer: &AnswerText,
    ) -> Vec<&'a PreparedCandidate> {
        prepared
            .candidates
            .iter()
            .filter(|c| {
                if c.title.is_empty() {
                    return false;
                }
                if answer.lower.contains(&c.title) {
                    return true;
                }
                if c.title_words.is_empty() {
                    return false;
                }
                let found = c.title_words.iter().filter(|w| answer.words.contains(*w)).count();
                let coverage = found as f64 / c.title_words.len() as f64;
                found >= self.leniency.min_words() && coverage >= self.leniency.min_coverage()
            })
            .collect()
    }
}

/// Free-function form of [`ReferencePolicy::filter`].
pub fn filter_references(
    candidates: &[SearchResult],
    answer: &str,
    policy: &ReferencePolicy,
) -> Vec<Reference> {
    policy.filter(candidates, answer)
}

/// Candidate-side inputs of the filter: lowercased titles, meaningful title
/// words, snippet phrases and the fallback's significant words.
#[derive(Debug, Clone, Default)]
pub struct PreparedCandidates {
    candidates: Vec<PreparedCandidate>,
    /// Significant words of the top-ranked candidate.
    fallback_words: Vec<String>,
}

#[derive(Debug, Clone)]
struct PreparedCandidate {
    reference: Reference,
    title: String,
    title_words: Vec<String>,
    phrases: Vec<Phrase>,
}

/// A snippet phrase, space-padded to match against [`AnswerText::padded`].
#[derive(Debug, Clone)]
struct Phrase {
    padded: String,
    words: Vec<String>,
}

impl PreparedCandidates {
    pub fn new(candidates: &[SearchResult]) -> Self {
        let prepared = candidates
            .iter()
            .map(|c| {
                let title = c.title.trim().to_lowercase();
                let title_words = words(&title)
                    .filter(|w| w.chars().count() > 3 && !is_filter_stopword(w))
                    .collect();
                let phrases = snippet_phrases(&c.snippet)
                    .into_iter()
                    .map(|p| Phrase {
                        padded: format!(" {} ", p),
                        words: p.split(' ').map(str::to_string).collect(),
                    })
                    .collect();
                PreparedCandidate {
                    reference: c.reference(),
                    title,
                    title_words,
                    phrases,
                }
            })
            .collect();

        Self {
            candidates: prepared,
            fallback_words: candidates.first().map(significant_words).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Precomputed views of the answer text.
struct AnswerText {
    lower: String,
    words: HashSet<String>,
    /// Words joined by single spaces, padded so phrase checks align on word
    /// boundaries.
    padded: String,
    chars: usize,
}

impl AnswerText {
    fn new(answer: &str) -> Self {
        let lower = answer.to_lowercase().replace('\u{2019}', "'");
        let tokens: Vec<String> = words(&lower).collect();
        Self {
            padded: format!(" {} ", tokens.join(" ")),
            words: tokens.into_iter().collect(),
            chars: answer.chars().count(),
            lower,
        }
    }

    fn has_phrase(&self, phrase: &Phrase) -> bool {
        phrase.words.iter().all(|w| self.words.contains(w)) && self.padded.contains(&phrase.padded)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn is_filter_stopword(word: &str) -> bool {
    FILTER_STOPWORDS.contains(&word)
}

/// Phrase hits required, scaled by answer length.
fn phrase_threshold(answer_chars: usize) -> usize {
    if answer_chars < 300 {
        1
    } else if answer_chars < 800 {
        2
    } else {
        3
    }
}

/// Word windows and short sentences from a snippet, normalised to
/// space-joined lowercase words.
fn snippet_phrases(snippet: &str) -> Vec<String> {
    let core = strip_ellipsis(snippet);
    let tokens: Vec<String> = words(core).collect();
    let mut phrases: Vec<String> = Vec::new();

    for size in 3..=5 {
        for window in tokens.windows(size) {
            let (first, last) = (&window[0], &window[size - 1]);
            if is_filter_stopword(first) || is_filter_stopword(last) {
                continue;
            }
            let phrase = window.join(" ");
            if phrase.len() > 10 && !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
        }
    }

    for sentence in core.split(['.', '!', '?']) {
        let normalised = words(sentence).collect::<Vec<_>>().join(" ");
        let len = normalised.chars().count();
        if (20..=100).contains(&len) && !phrases.contains(&normalised) {
            phrases.push(normalised);
        }
    }

    phrases
}

fn phrase_matches<'a>(
    prepared: &'a PreparedCandidates,
    answer: &AnswerText,
) -> Vec<&'a PreparedCandidate> {
    let threshold = phrase_threshold(answer.chars);
    prepared
        .candidates
        .iter()
        .filter(|c| {
            if c.phrases.is_empty() {
                return false;
            }
            let needed = threshold.min(c.phrases.len());
            c.phrases.iter().filter(|p| answer.has_phrase(p)).count() >= needed
        })
        .collect()
}

fn significant_words(result: &SearchResult) -> Vec<String> {
    let mut significant: Vec<String> = Vec::new();
    for w in words(&result.title).chain(words(strip_ellipsis(&result.snippet))) {
        if w.chars().count() > 4 && !is_filter_stopword(&w) && !significant.contains(&w) {
            significant.push(w);
        }
    }
    significant
}

fn fallback_match<'a>(
    prepared: &'a PreparedCandidates,
    answer: &AnswerText,
) -> Option<&'a PreparedCandidate> {
    if answer.chars <= FALLBACK_MIN_ANSWER_CHARS {
        return None;
    }
    let top = prepared.candidates.first()?;
    let significant = &prepared.fallback_words;
    if significant.is_empty() {
        return None;
    }

    let needed = significant.len().min(2);
    let found = significant.iter().filter(|w| answer.words.contains(*w)).count();
    (found >= needed).then_some(top)
}

fn dedup(matched: Vec<&PreparedCandidate>) -> Vec<Reference> {
    let mut seen: HashSet<&str> = HashSet::new();
    matched
        .into_iter()
        .filter(|c| seen.insert(c.reference.url.as_str()))
        .map(|c| c.reference.clone())
        .collect()
}
