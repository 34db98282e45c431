//! HTTP API tests against a stub Ollama server.
//!
//! Each test starts a small axum app that speaks the Ollama `/api/chat` and
//! `/api/tags` endpoints, then runs the real server against a file store in
//! a temporary directory.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use kb_helpdesk::config::Config;
use kb_helpdesk::fs_store::{document_id, FileStore};
use kb_helpdesk::server::run_server;
use kb_helpdesk_core::models::Document;
use kb_helpdesk_core::store::Store;
use serde_json::{json, Value};
use tempfile::TempDir;

const ANSWER_PARTS: &[&str] = &["You must ", "reset your password", " within 24 hours."];

// ─── Stub Ollama ────────────────────────────────────────────────────

async fn stub_chat(Json(req): Json<Value>) -> Response {
    if req["stream"] == json!(true) {
        let mut body = String::new();
        for part in ANSWER_PARTS {
            body.push_str(&json!({"message": {"role": "assistant", "content": part}, "done": false}).to_string());
            body.push('\n');
        }
        body.push_str(&json!({"message": {"role": "assistant", "content": ""}, "done": true}).to_string());
        body.push('\n');
        return Response::builder()
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(Body::from(body))
            .unwrap();
    }
    Json(json!({
        "message": {"role": "assistant", "content": ANSWER_PARTS.concat()},
        "done": true,
    }))
    .into_response()
}

async fn stub_tags() -> Json<Value> {
    Json(json!({"models": [{"name": "gemma3:1b"}, {"name": "llama3:8b"}]}))
}

async fn start_stub_ollama() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new()
        .route("/api/chat", post(stub_chat))
        .route("/api/tags", get(stub_tags));
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    port
}

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config(tmp: &TempDir, port: u16, llm_url: &str) -> Config {
    let mut cfg = Config::default();
    cfg.store.dir = tmp.path().join("kb");
    cfg.server.bind = format!("127.0.0.1:{}", port);
    cfg.llm.url = llm_url.to_string();
    cfg.llm.timeout_secs = 5;
    cfg
}

async fn seed_password_policy(cfg: &Config) -> String {
    let store = FileStore::new(&cfg.store.dir);
    let url = "https://intranet.example.com/it/password-policy";
    let doc = Document {
        id: document_id(url),
        title: "Password Reset Policy".to_string(),
        url: url.to_string(),
        body: "You must reset your password within 24 hours of a security alert. \
               Contact the service desk if the reset link has expired."
            .to_string(),
        crawled_at: Utc::now(),
    };
    store.upsert_document(&doc).await.unwrap()
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    handle: tokio::task::JoinHandle<()>,
    doc_id: String,
}

impl TestServer {
    async fn start(llm_url: Option<String>) -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();
        let llm_url = match llm_url {
            Some(url) => url,
            None => format!("http://127.0.0.1:{}", start_stub_ollama().await),
        };
        let cfg = test_config(&tmp, port, &llm_url);
        let doc_id = seed_password_policy(&cfg).await;

        let handle = tokio::spawn(async move {
            run_server(&cfg).await.ok();
        });
        wait_for_server(port).await;

        Self {
            _tmp: tmp,
            base: format!("http://127.0.0.1:{}", port),
            handle,
            doc_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_version() {
    let server = TestServer::start(None).await;
    let body: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_chat_answers_with_reference() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/chat"))
        .json(&json!({"message": "How do I reset my password?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK.as_u16());
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["response"], ANSWER_PARTS.concat());
    assert_eq!(body["source"], "knowledge_base");
    assert_eq!(body["references"][0]["title"], "Password Reset Policy");
    assert_eq!(body["debug"]["hasRelevantInfo"], true);
    assert_eq!(body["debug"]["model"], "gemma3:1b");
}

#[tokio::test]
async fn test_chat_stream_is_ndjson_ending_in_done() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/chat/stream"))
        .json(&json!({"message": "How do I reset my password?", "history": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK.as_u16());
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE.as_str()],
        "application/x-ndjson"
    );

    let text = resp.text().await.unwrap();
    let envelopes: Vec<Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(envelopes.first().unwrap()["type"], "metadata");
    assert_eq!(envelopes.last().unwrap()["type"], "done");
    assert_eq!(envelopes.iter().filter(|e| e["type"] == "done").count(), 1);

    let answer: String = envelopes
        .iter()
        .filter(|e| e["type"] == "content")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    assert_eq!(answer, ANSWER_PARTS.concat());

    let last_meta = envelopes
        .iter()
        .rev()
        .find(|e| e["type"] == "metadata")
        .unwrap();
    assert_eq!(last_meta["source"], "knowledge_base");
    assert_eq!(last_meta["references"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_greeting_needs_no_backend() {
    // Nothing listens on port 9; a greeting must still be answered.
    let server = TestServer::start(Some("http://127.0.0.1:9".to_string())).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(server.url("/api/chat"))
        .json(&json!({"message": "Hello!"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["source"], "predefined");
    assert!(body["references"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_apologises() {
    let server = TestServer::start(Some("http://127.0.0.1:9".to_string())).await;
    let client = reqwest::Client::new();

    let text = client
        .post(server.url("/api/chat/stream"))
        .json(&json!({"message": "How do I reset my password?"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let envelopes: Vec<Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(envelopes.last().unwrap()["type"], "done");
    let content: Vec<&str> = envelopes
        .iter()
        .filter(|e| e["type"] == "content")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    assert_eq!(
        content,
        vec!["Sorry, there was an error processing your request. Please try again."]
    );
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    for path in ["/api/chat", "/api/chat/stream"] {
        for payload in [json!({"message": "   "}), json!({"history": []}), json!({"message": 42})] {
            let resp = client
                .post(server.url(path))
                .json(&payload)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16(), "{} {}", path, payload);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["error"]["code"], "bad_request");
        }
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    for path in ["/api/chat", "/api/search", "/api/crawl"] {
        let resp = client
            .post(server.url(path))
            .header(header::CONTENT_TYPE.as_str(), "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16(), "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn test_documents_list_and_delete() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let list: Value = reqwest::get(server.url("/api/documents"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 1);
    assert_eq!(list["entries"][0]["id"], server.doc_id.as_str());

    let doc_url = server.url(&format!("/api/documents/{}", server.doc_id));
    let resp = client.delete(&doc_url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK.as_u16());

    let resp = client.delete(&doc_url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND.as_u16());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let list: Value = reqwest::get(server.url("/api/documents"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 0);
    assert_eq!(list["message"], "Knowledge base is empty");
}

#[tokio::test]
async fn test_search_endpoint() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(server.url("/api/search"))
        .json(&json!({"query": "password reset", "limit": 5}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["title"], "Password Reset Policy");

    let resp = client
        .post(server.url("/api/search"))
        .json(&json!({"query": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16());
}

#[tokio::test]
async fn test_crawl_rejects_non_http_url() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/crawl"))
        .json(&json!({"url": "ftp://example.com/file"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16());
}

#[tokio::test]
async fn test_models_listing_and_fallback() {
    let server = TestServer::start(None).await;
    let body: Value = reqwest::get(server.url("/api/models"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["models"], json!(["gemma3:1b", "llama3:8b"]));
    assert_eq!(body["default"], "gemma3:1b");

    let offline = TestServer::start(Some("http://127.0.0.1:9".to_string())).await;
    let resp = reqwest::get(offline.url("/api/models")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR.as_u16());
    let body: Value = resp.json().await.unwrap();
    assert!(body["fallbackModels"]
        .as_array()
        .unwrap()
        .contains(&json!("gemma3:1b")));
}
