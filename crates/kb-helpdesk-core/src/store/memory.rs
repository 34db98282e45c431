//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Documents live in a `Vec` behind `std::sync::RwLock`; insertion order is
//! the iteration order, and re-inserting an existing identifier keeps its
//! position.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::Document;

use super::Store;

pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
        }
    }

    pub fn with_documents(docs: Vec<Document>) -> Self {
        Self {
            docs: RwLock::new(docs),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(docs.clone())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        let mut docs = self.docs.write().map_err(|_| anyhow!("store lock poisoned"))?;
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => docs.push(doc.clone()),
        }
        Ok(doc.id.clone())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().map_err(|_| anyhow!("store lock poisoned"))?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(docs.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, body: &str) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_uppercase(),
            url: format!("https://example.com/{}", id),
            body: body.to_string(),
            crawled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_position() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("a", "one")).await.unwrap();
        store.upsert_document(&doc("b", "two")).await.unwrap();
        store.upsert_document(&doc("a", "three")).await.unwrap();

        let all = store.list_documents().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(all[0].body, "three");
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = InMemoryStore::with_documents(vec![doc("a", "one")]);
        assert!(store.get_document("a").await.unwrap().is_some());
        assert!(store.delete_document("a").await.unwrap());
        assert!(!store.delete_document("a").await.unwrap());
        assert!(store.get_document("a").await.unwrap().is_none());
    }
}
