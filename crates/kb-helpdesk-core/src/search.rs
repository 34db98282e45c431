//! Keyword search over the whole knowledge base.
//!
//! The search operates entirely through the [`Store`] trait:
//!
//! 1. Extract [`QueryTerms`] from the query; no terms means no results.
//! 2. Score every document with [`score_document`], dropping non-matches.
//! 3. Sort by relevance, descending. The sort is stable, so ties keep the
//!    store's iteration order.
//!
//! A store that is missing or cannot be listed yields an empty result list;
//! it is logged, not surfaced as an error.

use tracing::{debug, warn};

use crate::models::{Document, SearchResult};
use crate::score::score_document;
use crate::store::Store;
use crate::terms::{QueryTerms, TermExtractor};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Chars kept either side of the earliest match in a snippet.
    pub snippet_radius: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            snippet_radius: 200,
        }
    }
}

/// Term extraction plus scoring, bundled with their tunables.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeSearch {
    extractor: TermExtractor,
    params: SearchParams,
}

impl KnowledgeSearch {
    pub fn new(extractor: TermExtractor, params: SearchParams) -> Self {
        Self { extractor, params }
    }

    pub fn extractor(&self) -> &TermExtractor {
        &self.extractor
    }

    pub fn terms(&self, query: &str) -> QueryTerms {
        self.extractor.extract(query)
    }

    /// Extract terms from `query` and rank the store against them.
    pub async fn search<S: Store + ?Sized>(&self, store: &S, query: &str) -> Vec<SearchResult> {
        let terms = self.terms(query);
        self.search_terms(store, &terms).await
    }

    /// Rank the store against already-extracted terms.
    pub async fn search_terms<S: Store + ?Sized>(
        &self,
        store: &S,
        terms: &QueryTerms,
    ) -> Vec<SearchResult> {
        if terms.is_empty() {
            return Vec::new();
        }

        let docs = match store.list_documents().await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "document store unavailable, searching nothing");
                return Vec::new();
            }
        };

        let results = rank(&docs, terms, &self.params);
        debug!(
            documents = docs.len(),
            results = results.len(),
            top = results.first().map(|r| r.relevance),
            "knowledge search complete"
        );
        results
    }
}

/// Score and sort a document slice. Pure; the async entry points delegate here.
pub fn rank(docs: &[Document], terms: &QueryTerms, params: &SearchParams) -> Vec<SearchResult> {
    if terms.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = docs
        .iter()
        .filter_map(|d| score_document(d, terms, params.snippet_radius))
        .collect();

    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    results
}
