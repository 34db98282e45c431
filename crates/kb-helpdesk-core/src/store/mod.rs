//! Document store abstraction.
//!
//! The [`Store`] trait is the only view of the knowledge base the retrieval
//! engine has: a durable collection of crawled [`Document`]s that can be
//! listed in full or fetched by identifier. Concrete backends (the
//! file-per-document store in the application crate, [`memory::InMemoryStore`]
//! for tests) are passed in as values; there is no global store.
//!
//! Implementations must be `Send + Sync`. Reads never mutate, so concurrent
//! queries scan the same store without coordination.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// Abstract storage backend for crawled documents.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_documents`](Store::list_documents) | Every readable document, in store order |
/// | [`get_document`](Store::get_document) | One document by identifier |
/// | [`upsert_document`](Store::upsert_document) | Insert or replace a document |
/// | [`delete_document`](Store::delete_document) | Remove a document |
#[async_trait]
pub trait Store: Send + Sync {
    /// All documents, in a stable iteration order.
    ///
    /// Entries that cannot be read are skipped rather than failing the call.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Returns the identifier the document is stored under.
    async fn upsert_document(&self, doc: &Document) -> Result<String>;

    /// Returns `false` when no such document existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;
}
