//! Relevance gate: does the knowledge base hold enough signal to answer?
//!
//! The gate is an OR over independent signals, evaluated in order:
//!
//! | Signal | Accepts when |
//! |--------|--------------|
//! | no results | never (reject) |
//! | empty term set | policy: strict needs top relevance above a floor, permissive accepts |
//! | exact phrase | space-joined keywords appear in a top-3 title + snippet |
//! | technical term | any technical term appears in a top-3 title + snippet |
//! | term coverage | a top-2 title + snippet holds `ceil(coverage × |terms|)` terms |
//! | top relevance | the best result scores above the threshold |
//!
//! Adding a signal can only flip a rejection into an acceptance.

use serde::{Deserialize, Serialize};

use crate::models::SearchResult;
use crate::terms::QueryTerms;

/// How to treat a query with no significant terms that still produced results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyTermsPolicy {
    /// Accept only when the top result clears `empty_terms_min_relevance`.
    #[default]
    Strict,
    /// Accept whenever any result exists.
    Permissive,
}

/// Gate thresholds, all in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub empty_terms: EmptyTermsPolicy,
    pub empty_terms_min_relevance: f64,
    pub top_relevance: f64,
    pub term_coverage: f64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            empty_terms: EmptyTermsPolicy::Strict,
            empty_terms_min_relevance: 0.8,
            top_relevance: 0.7,
            term_coverage: 0.6,
        }
    }
}

/// Which signal settled the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    NoResults,
    EmptyTerms,
    ExactPhrase,
    TechnicalTerm,
    TermCoverage,
    TopRelevance,
    WeakSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub accepted: bool,
    pub reason: GateReason,
}

impl GateDecision {
    fn accept(reason: GateReason) -> Self {
        Self {
            accepted: true,
            reason,
        }
    }

    fn reject(reason: GateReason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

impl GatePolicy {
    pub fn evaluate(&self, results: &[SearchResult], terms: &QueryTerms) -> GateDecision {
        let Some(top) = results.first() else {
            return GateDecision::reject(GateReason::NoResults);
        };

        if terms.is_empty() {
            let accepted = match self.empty_terms {
                EmptyTermsPolicy::Strict => top.relevance > self.empty_terms_min_relevance,
                EmptyTermsPolicy::Permissive => true,
            };
            return GateDecision {
                accepted,
                reason: GateReason::EmptyTerms,
            };
        }

        let top3: Vec<String> = results.iter().take(3).map(|r| r.gate_text()).collect();

        if terms.phrase.contains(' ') && top3.iter().any(|t| t.contains(&terms.phrase)) {
            return GateDecision::accept(GateReason::ExactPhrase);
        }

        if terms
            .technical
            .iter()
            .any(|tech| top3.iter().any(|t| t.contains(tech.as_str())))
        {
            return GateDecision::accept(GateReason::TechnicalTerm);
        }

        let needed = (self.term_coverage * terms.len() as f64).ceil().max(1.0) as usize;
        let covered = top3.iter().take(2).any(|text| {
            terms.terms.iter().filter(|t| text.contains(t.as_str())).count() >= needed
        });
        if covered {
            return GateDecision::accept(GateReason::TermCoverage);
        }

        if top.relevance > self.top_relevance {
            return GateDecision::accept(GateReason::TopRelevance);
        }

        GateDecision::reject(GateReason::WeakSignal)
    }

    pub fn has_relevant_information(&self, results: &[SearchResult], terms: &QueryTerms) -> bool {
        self.evaluate(results, terms).accepted
    }
}
