//! `kbh search` and `POST /api/search`: ranked knowledge search, with a
//! message explaining an empty result.

use anyhow::Result;
use serde::Serialize;

use kb_helpdesk_core::models::SearchResult;
use kb_helpdesk_core::search::KnowledgeSearch;
use kb_helpdesk_core::store::Store;

use crate::config::Config;
use crate::fs_store::FileStore;

/// Response shape shared by `kbh search` and `POST /api/search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub count: usize,
    pub key_terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Ranked knowledge search, with an explanatory message when nothing could
/// match.
pub async fn search_documents(
    search: &KnowledgeSearch,
    store: &dyn Store,
    query: &str,
    limit: Option<usize>,
) -> Result<SearchResponse> {
    let terms = search.terms(query);
    if terms.is_empty() {
        return Ok(SearchResponse {
            results: Vec::new(),
            count: 0,
            key_terms: Vec::new(),
            message: Some("Query too short or contains only common words".to_string()),
        });
    }

    let mut results = search.search_terms(store, &terms).await;
    if let Some(limit) = limit {
        results.truncate(limit);
    }

    let message = if !results.is_empty() {
        None
    } else if store.list_documents().await.map(|d| d.is_empty()).unwrap_or(true) {
        Some("Knowledge base is empty".to_string())
    } else {
        Some("No matching documents".to_string())
    };

    Ok(SearchResponse {
        count: results.len(),
        results,
        key_terms: terms.terms,
        message,
    })
}

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let store = FileStore::new(&config.store.dir);
    let search = config.knowledge_search();
    let response = search_documents(&search, &store, query, limit).await?;

    if response.results.is_empty() {
        match &response.message {
            Some(msg) => println!("No results ({}).", msg.to_lowercase()),
            None => println!("No results."),
        }
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.relevance, result.title);
        println!("    url: {}", result.url);
        println!("    id: {}", result.id);
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }

    Ok(())
}
