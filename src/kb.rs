//! Knowledge-base entry management: list, show and delete.
//!
//! Used by the `kbh list|show|delete` commands and the `/api/documents`
//! endpoints.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use kb_helpdesk_core::models::Document;
use kb_helpdesk_core::store::Store;

use crate::config::Config;
use crate::fs_store::FileStore;

#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub id: String,
    pub title: String,
    pub url: String,
    pub crawled_at: String, // ISO8601
    pub chars: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryList {
    pub entries: Vec<EntrySummary>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Full entry returned by `show`.
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub id: String,
    pub title: String,
    pub url: String,
    pub crawled_at: String, // ISO8601
    pub body: String,
}

fn format_ts_iso(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn summary(doc: &Document) -> EntrySummary {
    EntrySummary {
        id: doc.id.clone(),
        title: doc.title.clone(),
        url: doc.url.clone(),
        crawled_at: format_ts_iso(&doc.crawled_at),
        chars: doc.body.chars().count(),
    }
}

/// All entries, newest first.
pub async fn list_entries(store: &dyn Store) -> Result<EntryList> {
    let mut docs = store.list_documents().await?;
    docs.sort_by(|a, b| b.crawled_at.cmp(&a.crawled_at));

    let entries: Vec<EntrySummary> = docs.iter().map(summary).collect();
    let message = entries
        .is_empty()
        .then(|| "Knowledge base is empty".to_string());
    Ok(EntryList {
        count: entries.len(),
        entries,
        message,
    })
}

pub async fn get_entry(store: &dyn Store, id: &str) -> Result<Option<EntryResponse>> {
    Ok(store.get_document(id).await?.map(|doc| EntryResponse {
        crawled_at: format_ts_iso(&doc.crawled_at),
        id: doc.id,
        title: doc.title,
        url: doc.url,
        body: doc.body,
    }))
}

pub async fn delete_entry(store: &dyn Store, id: &str) -> Result<bool> {
    let deleted = store.delete_document(id).await?;
    if deleted {
        tracing::info!(id = %id, "deleted knowledge base entry");
    }
    Ok(deleted)
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = FileStore::new(&config.store.dir);
    let list = list_entries(&store).await?;

    if let Some(msg) = &list.message {
        println!("{}.", msg);
        return Ok(());
    }

    println!("{} entries:\n", list.count);
    for e in &list.entries {
        println!("{}  {}", e.crawled_at, e.title);
        println!("    url: {}", e.url);
        println!("    id:  {}  ({} chars)", e.id, e.chars);
    }
    Ok(())
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let store = FileStore::new(&config.store.dir);
    let Some(entry) = get_entry(&store, id).await? else {
        bail!("document not found: {}", id);
    };

    println!("--- Document ---");
    println!("id:         {}", entry.id);
    println!("title:      {}", entry.title);
    println!("url:        {}", entry.url);
    println!("crawled_at: {}", entry.crawled_at);
    println!();
    println!("--- Body ---");
    println!("{}", entry.body);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = FileStore::new(&config.store.dir);
    if !delete_entry(&store, id).await? {
        bail!("document not found: {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}
