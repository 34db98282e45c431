//! File-per-document knowledge base.
//!
//! Each document is one JSON file in the store directory, named after a
//! URL-safe base64 encoding of its source URL:
//!
//! ```text
//! knowledge-base/
//!   aHR0cHM6Ly9leGFtcGxlLmNvbS9wdw.json   {"title", "url", "crawled_at", "body"}
//! ```
//!
//! Encodings longer than [`MAX_ENCODED_ID`] are cut to that length and
//! suffixed with the URL's SHA-256, keeping file names well under the usual
//! 255-byte limit. The file stem is the document identifier and every file
//! records its own URL, so the directory alone is enough to rebuild the
//! store. A missing directory is an empty store;
//! files that cannot be read or parsed are skipped with a warning.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use kb_helpdesk_core::models::Document;
use kb_helpdesk_core::store::Store;

const EXTENSION: &str = "json";

/// Longest plain base64 identifier; longer URLs get a digest suffix.
pub const MAX_ENCODED_ID: usize = 128;

/// On-disk form of a [`Document`]; the identifier lives in the file name.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    title: String,
    url: String,
    crawled_at: DateTime<Utc>,
    body: String,
}

/// Stable, filename-safe identifier for a URL.
pub fn document_id(url: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(url.as_bytes());
    if encoded.len() <= MAX_ENCODED_ID {
        return encoded;
    }
    let digest = Sha256::digest(url.as_bytes());
    format!("{}_{:x}", &encoded[..MAX_ENCODED_ID], digest)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }

    fn read(path: &Path, id: &str) -> Result<Document> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let stored: StoredDocument = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Document {
            id: id.to_string(),
            title: stored.title,
            url: stored.url,
            body: stored.body,
            crawled_at: stored.crawled_at,
        })
    }
}

#[async_trait]
impl Store for FileStore {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "knowledge base directory missing");
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        let walker = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry
                .with_context(|| format!("Failed to list {}", self.dir.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION)
            {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::read(path, id) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable document"),
            }
        }
        Ok(docs)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path, id).map(Some)
    }

    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        if !is_valid_id(&doc.id) {
            anyhow::bail!("invalid document id: {}", doc.id);
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let stored = StoredDocument {
            title: doc.title.clone(),
            url: doc.url.clone(),
            crawled_at: doc.crawled_at,
            body: doc.body.clone(),
        };
        let path = self.path_for(&doc.id);
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(doc.id.clone())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        Ok(true)
    }
}
