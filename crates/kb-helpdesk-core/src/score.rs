//! Per-document relevance scoring.
//!
//! ```text
//! relevance = matched / |terms|
//!           + 0.5 × title_matched / |terms|          (if any title hit)
//!           + 0.5                                    (if exact phrase)
//!           + 0.8 × technical_matched / |technical|  (if any technical hit)
//! capped at 1.0
//! ```
//!
//! The additive bonuses let title, phrase and product-name hits dominate
//! plain term frequency on short helpdesk queries.

use crate::models::{Document, SearchResult};
use crate::terms::QueryTerms;
use crate::text::{excerpt, FoldedText};

pub const TITLE_WEIGHT: f64 = 0.5;
pub const PHRASE_BONUS: f64 = 0.5;
pub const TECHNICAL_WEIGHT: f64 = 0.8;

/// Signals collected while scoring one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub matched: usize,
    pub title_matched: usize,
    pub technical_matched: usize,
    pub exact_phrase: bool,
}

impl ScoreBreakdown {
    pub fn relevance(&self, terms: &QueryTerms) -> f64 {
        if terms.is_empty() {
            return 0.0;
        }
        let n = terms.len() as f64;
        let mut score = self.matched as f64 / n;
        if self.title_matched > 0 {
            score += self.title_matched as f64 / n * TITLE_WEIGHT;
        }
        if self.exact_phrase {
            score += PHRASE_BONUS;
        }
        if self.technical_matched > 0 && !terms.technical.is_empty() {
            let t = terms.technical.len() as f64;
            score += self.technical_matched as f64 / t * TECHNICAL_WEIGHT;
        }
        score.min(1.0)
    }
}

/// Score one document against the query terms.
///
/// Returns `None` when no term occurs in the body, which excludes the
/// document from the result list.
pub fn score_document(
    doc: &Document,
    terms: &QueryTerms,
    snippet_radius: usize,
) -> Option<SearchResult> {
    if terms.is_empty() || !doc.is_searchable() {
        return None;
    }

    let body = FoldedText::new(&doc.body);
    let title = doc.title.to_lowercase();

    let mut breakdown = ScoreBreakdown {
        exact_phrase: terms.phrase.contains(' ') && body.contains(&terms.phrase),
        ..Default::default()
    };

    breakdown.technical_matched = terms.technical.iter().filter(|t| body.contains(t)).count();
    breakdown.title_matched = terms.terms.iter().filter(|t| title.contains(t.as_str())).count();

    // Earliest match anchors the snippet.
    let mut best: Option<(usize, usize)> = None;
    for term in &terms.terms {
        if let Some((start, end)) = body.find(term) {
            breakdown.matched += 1;
            if best.map_or(true, |(s, _)| start < s) {
                best = Some((start, end));
            }
        }
    }

    let (start, end) = best?;

    Some(SearchResult {
        id: doc.id.clone(),
        title: doc.title.clone(),
        url: doc.url.clone(),
        snippet: excerpt(&doc.body, start, end, snippet_radius),
        relevance: breakdown.relevance(terms),
    })
}
