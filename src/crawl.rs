//! Fetch a web page and add it to the knowledge base.
//!
//! A failed fetch still produces a document when
//! `crawl.placeholder_on_error` is set: a short placeholder titled with the
//! host name that records the error, so the URL shows up in the list and
//! can be re-crawled later.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use kb_helpdesk_core::models::Document;
use kb_helpdesk_core::store::Store;

use crate::config::{Config, CrawlConfig};
use crate::extract::{extract_page, ExtractedPage};
use crate::fs_store::{document_id, FileStore};

/// Result of one crawl, as reported to the CLI and the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub id: String,
    pub title: String,
    pub url: String,
    pub chars: usize,
    pub placeholder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse and check a user-supplied URL. Only http and https are crawlable.
pub fn parse_crawl_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("URL is required");
    }
    let url = Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("Unsupported URL scheme '{}': must be http or https", other),
    }
}

pub fn build_client(config: &CrawlConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()?;
    Ok(client)
}

/// Fetch `url`, extract it and store the result (or a placeholder).
pub async fn crawl(config: &Config, store: &dyn Store, url: &Url) -> Result<CrawlOutcome> {
    let client = build_client(&config.crawl)?;
    let url_str = url.as_str().to_string();

    let (document, error) = match fetch(&client, url).await {
        Ok(page) => (
            Document {
                id: document_id(&url_str),
                title: page.title,
                url: url_str.clone(),
                body: page.body,
                crawled_at: Utc::now(),
            },
            None,
        ),
        Err(e) if config.crawl.placeholder_on_error => {
            warn!(url = %url_str, error = %e, "crawl failed, storing placeholder");
            (placeholder(url, &e), Some(format!("{:#}", e)))
        }
        Err(e) => return Err(e.context(format!("Failed to crawl {}", url_str))),
    };

    store.upsert_document(&document).await?;
    info!(url = %url_str, id = %document.id, chars = document.body.len(), "stored document");

    Ok(CrawlOutcome {
        id: document.id,
        title: document.title,
        url: document.url,
        chars: document.body.chars().count(),
        placeholder: error.is_some(),
        error,
    })
}

async fn fetch(client: &reqwest::Client, url: &Url) -> Result<ExtractedPage> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        bail!("HTTP {} from {}", status, url);
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = response.bytes().await?;
    Ok(extract_page(&bytes, content_type.as_deref())?)
}

fn placeholder(url: &Url, error: &anyhow::Error) -> Document {
    let title = url
        .host_str()
        .filter(|h| !h.is_empty())
        .unwrap_or("Website")
        .to_string();
    let body = format!(
        "This is a placeholder for the website {url} which could not be crawled automatically.\n\
         The website may have security measures that prevent automated crawling.\n\
         Error: {error:#}"
    );
    Document {
        id: document_id(url.as_str()),
        title,
        url: url.as_str().to_string(),
        body,
        crawled_at: Utc::now(),
    }
}

pub async fn run_crawl(config: &Config, raw_url: &str) -> Result<()> {
    let url = parse_crawl_url(raw_url)?;
    let store = FileStore::new(&config.store.dir);
    let outcome = crawl(config, &store, &url).await?;

    if outcome.placeholder {
        println!(
            "Stored placeholder for {} ({})",
            outcome.url,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    } else {
        println!("Crawled: {}", outcome.title);
        println!("  url: {}", outcome.url);
        println!("  chars: {}", outcome.chars);
    }
    println!("  id: {}", outcome.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crawl_url() {
        assert!(parse_crawl_url("https://example.com/page").is_ok());
        assert!(parse_crawl_url("  http://example.com  ").is_ok());
        assert!(parse_crawl_url("").is_err());
        assert!(parse_crawl_url("not a url").is_err());
        assert!(parse_crawl_url("ftp://example.com/file").is_err());
    }

    #[test]
    fn test_placeholder_records_error() {
        let url = Url::parse("https://intranet.example.com/vpn").unwrap();
        let doc = placeholder(&url, &anyhow::anyhow!("connection refused"));
        assert_eq!(doc.title, "intranet.example.com");
        assert!(doc.body.contains("could not be crawled"));
        assert!(doc.body.contains("Error: connection refused"));
        assert_eq!(doc.id, document_id("https://intranet.example.com/vpn"));
    }
}
