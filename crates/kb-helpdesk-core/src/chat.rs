//! Generation orchestrator: predefined answers, retrieval, gating, model
//! call and reference attribution, in single-shot and streaming form.
//!
//! Per request:
//!
//! ```text
//! message ──► canned table hit? ──yes──► predefined answer ──► done
//!                 │no
//!                 ▼
//!           search + gate ──reject──► no-information answer ──► done
//!                 │accept
//!                 ▼
//!           prompt ──► backend ──► tokens (+ reference metadata) ──► done
//!                          └─ failure ──► apology ──► done
//! ```
//!
//! Every path ends with exactly one [`Envelope::Done`]; backend failures are
//! turned into [`APOLOGY_MESSAGE`], never returned to the caller.
//!
//! The stream is pull-based. Nothing runs until it is polled, and dropping
//! it drops the backend's [`FragmentStream`] with it.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{BackendError, ChatBackend, Fragment, FragmentStream};
use crate::canned::CannedAnswers;
use crate::gate::{GateDecision, GatePolicy, GateReason};
use crate::models::{
    AnswerSource, ChatMessage, GenerationConfig, GenerationOverrides, Reference, SearchResult,
};
use crate::prompt::{assemble, PromptParams};
use crate::references::{contains_no_information, PreparedCandidates, ReferencePolicy, NO_INFO_MESSAGE};
use crate::search::KnowledgeSearch;
use crate::store::Store;
use crate::terms::QueryTerms;

/// Shown to the user whenever the backend fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, there was an error processing your request. Please try again.";

const DEBUG_SNIPPET_CHARS: usize = 100;

/// An incoming question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub config: Option<GenerationOverrides>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopResult {
    pub title: String,
    pub relevance: f64,
    pub snippet: String,
}

/// Diagnostic payload. Not a stable contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub query: String,
    pub key_terms: Vec<String>,
    pub technical_terms: Vec<String>,
    pub results_count: usize,
    pub has_relevant_info: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_reason: Option<GateReason>,
    pub top_results: Vec<TopResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Roughly answer length / 4.
    pub estimated_tokens: usize,
    pub references_used: usize,
}

impl DebugInfo {
    fn new(query: &str, terms: &QueryTerms, results: &[SearchResult], gate: GateDecision) -> Self {
        Self {
            query: query.to_string(),
            key_terms: terms.terms.clone(),
            technical_terms: terms.technical.clone(),
            results_count: results.len(),
            has_relevant_info: gate.accepted,
            gate_reason: Some(gate.reason),
            top_results: results.iter().take(3).map(top_result).collect(),
            ..Default::default()
        }
    }

    fn finish(&mut self, answer: &str, references: usize) {
        self.estimated_tokens = answer.chars().count() / 4;
        self.references_used = references;
    }
}

fn top_result(r: &SearchResult) -> TopResult {
    let mut snippet: String = r.snippet.chars().take(DEBUG_SNIPPET_CHARS).collect();
    if r.snippet.chars().count() > DEBUG_SNIPPET_CHARS {
        snippet.push_str("...");
    }
    TopResult {
        title: r.title.clone(),
        relevance: r.relevance,
        snippet,
    }
}

/// Single-shot answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub source: AnswerSource,
    pub references: Vec<Reference>,
    pub debug: DebugInfo,
}

/// One line of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Metadata {
        source: AnswerSource,
        references: Vec<Reference>,
        debug: DebugInfo,
    },
    Content {
        content: String,
    },
    Done,
}

impl Envelope {
    fn content(text: impl Into<String>) -> Self {
        Envelope::Content {
            content: text.into(),
        }
    }
}

/// Retrieval and generation tunables for one [`Orchestrator`].
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub search: KnowledgeSearch,
    pub gate: GatePolicy,
    pub prompt: PromptParams,
    pub references: ReferencePolicy,
    pub canned: CannedAnswers,
    pub generation: GenerationConfig,
}

enum Plan {
    Predefined {
        text: String,
        debug: DebugInfo,
    },
    NoInformation {
        debug: DebugInfo,
    },
    Generate {
        messages: Vec<ChatMessage>,
        candidates: Vec<SearchResult>,
        config: GenerationConfig,
        debug: DebugInfo,
    },
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    backend: Arc<dyn ChatBackend>,
    settings: Arc<EngineSettings>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn ChatBackend>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            backend,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    async fn plan(&self, request: &ChatRequest) -> Plan {
        if let Some(text) = self.settings.canned.lookup(&request.message) {
            debug!(query = %request.message, "predefined answer");
            return Plan::Predefined {
                text: text.to_string(),
                debug: DebugInfo {
                    query: request.message.clone(),
                    ..Default::default()
                },
            };
        }

        let search = &self.settings.search;
        let terms = search.terms(&request.message);
        let results = search.search_terms(self.store.as_ref(), &terms).await;
        let decision = self.settings.gate.evaluate(&results, &terms);
        debug!(
            query = %request.message,
            terms = ?terms.terms,
            results = results.len(),
            accepted = decision.accepted,
            reason = ?decision.reason,
            "relevance gate"
        );

        let mut debug = DebugInfo::new(&request.message, &terms, &results, decision);
        if !decision.accepted {
            return Plan::NoInformation { debug };
        }

        let overrides = request.config.clone().unwrap_or_default();
        let config = self.settings.generation.with_overrides(&overrides);
        debug.model = Some(config.model.clone());

        let prompt = assemble(
            self.store.as_ref(),
            &results,
            &request.history,
            &request.message,
            &config,
            &self.settings.prompt,
        )
        .await;

        Plan::Generate {
            messages: prompt.messages,
            candidates: results,
            config,
            debug,
        }
    }

    /// Answer in one call.
    pub async fn answer(&self, request: &ChatRequest) -> ChatResponse {
        match self.plan(request).await {
            Plan::Predefined { text, mut debug } => {
                debug.finish(&text, 0);
                ChatResponse {
                    response: text,
                    source: AnswerSource::Predefined,
                    references: Vec::new(),
                    debug,
                }
            }
            Plan::NoInformation { mut debug } => {
                debug.finish(NO_INFO_MESSAGE, 0);
                ChatResponse {
                    response: NO_INFO_MESSAGE.to_string(),
                    source: AnswerSource::NoInformation,
                    references: Vec::new(),
                    debug,
                }
            }
            Plan::Generate {
                messages,
                candidates,
                config,
                mut debug,
            } => match self.backend.complete(&messages, &config).await {
                Ok(text) => {
                    let prepared = PreparedCandidates::new(&candidates);
                    let (source, references) = self.attribute(&prepared, &text);
                    debug.finish(&text, references.len());
                    ChatResponse {
                        response: text,
                        source,
                        references,
                        debug,
                    }
                }
                Err(e) => {
                    warn!(backend = self.backend.name(), error = %e, "completion failed");
                    debug.finish(APOLOGY_MESSAGE, 0);
                    ChatResponse {
                        response: APOLOGY_MESSAGE.to_string(),
                        source: AnswerSource::Error,
                        references: Vec::new(),
                        debug,
                    }
                }
            },
        }
    }

    /// Answer as a stream of envelopes ending in exactly one `Done`.
    pub fn answer_stream(&self, request: ChatRequest) -> BoxStream<'static, Envelope> {
        let start = StreamState::Start {
            engine: self.clone(),
            request,
        };
        stream::unfold(start, |state| async move { state.step().await })
            .flat_map(stream::iter)
            .boxed()
    }

    fn attribute(
        &self,
        candidates: &PreparedCandidates,
        answer: &str,
    ) -> (AnswerSource, Vec<Reference>) {
        if contains_no_information(answer) {
            (AnswerSource::NoInformation, Vec::new())
        } else {
            let refs = self.settings.references.filter_prepared(candidates, answer);
            (AnswerSource::KnowledgeBase, refs)
        }
    }
}

/// Accumulated state of one streamed generation.
struct Generation {
    engine: Orchestrator,
    candidates: PreparedCandidates,
    answer: String,
    source: AnswerSource,
    references: Vec<Reference>,
    debug: DebugInfo,
}

impl Generation {
    fn metadata(&self) -> Envelope {
        Envelope::Metadata {
            source: self.source,
            references: self.references.clone(),
            debug: self.debug.clone(),
        }
    }

    /// Re-run attribution over the answer so far; true when it changed.
    fn reattribute(&mut self) -> bool {
        let (source, references) = self.engine.attribute(&self.candidates, &self.answer);
        if source == self.source && references == self.references {
            return false;
        }
        self.source = source;
        self.references = references;
        self.debug.references_used = self.references.len();
        true
    }

    /// Envelopes for one token: refreshed metadata when attribution changed,
    /// then the content itself.
    ///
    /// Attribution only looks at whole words, so it is re-run once a token
    /// completes one.
    fn push(&mut self, token: String) -> Vec<Envelope> {
        self.answer.push_str(&token);

        let mut out = Vec::with_capacity(2);
        if token.chars().any(|c| !c.is_alphanumeric()) && self.reattribute() {
            out.push(self.metadata());
        }
        out.push(Envelope::content(token));
        out
    }

    fn finish(mut self) -> Vec<Envelope> {
        self.reattribute();
        self.debug.finish(&self.answer, self.references.len());
        vec![self.metadata(), Envelope::Done]
    }

    fn fail(mut self, error: &BackendError) -> Vec<Envelope> {
        warn!(backend = self.engine.backend.name(), error = %error, "stream failed");
        self.source = AnswerSource::Error;
        self.references.clear();
        self.debug.finish(&self.answer, 0);
        vec![self.metadata(), Envelope::content(APOLOGY_MESSAGE), Envelope::Done]
    }
}

enum StreamState {
    Start {
        engine: Orchestrator,
        request: ChatRequest,
    },
    Streaming {
        fragments: FragmentStream,
        generation: Generation,
    },
    Finished,
}

impl StreamState {
    async fn step(self) -> Option<(Vec<Envelope>, StreamState)> {
        match self {
            StreamState::Start { engine, request } => Some(start(engine, request).await),
            StreamState::Streaming {
                mut fragments,
                mut generation,
            } => loop {
                match fragments.next().await {
                    Some(Ok(Fragment::Token(token))) => {
                        if token.is_empty() {
                            continue;
                        }
                        let out = generation.push(token);
                        return Some((
                            out,
                            StreamState::Streaming {
                                fragments,
                                generation,
                            },
                        ));
                    }
                    Some(Ok(Fragment::Done)) | None => {
                        return Some((generation.finish(), StreamState::Finished));
                    }
                    Some(Err(BackendError::Decode(line))) => {
                        warn!(line = %line, "skipping malformed backend output");
                    }
                    Some(Err(e)) => {
                        return Some((generation.fail(&e), StreamState::Finished));
                    }
                }
            },
            StreamState::Finished => None,
        }
    }
}

async fn start(engine: Orchestrator, request: ChatRequest) -> (Vec<Envelope>, StreamState) {
    match engine.plan(&request).await {
        Plan::Predefined { text, mut debug } => {
            debug.finish(&text, 0);
            let meta = Envelope::Metadata {
                source: AnswerSource::Predefined,
                references: Vec::new(),
                debug,
            };
            (
                vec![meta, Envelope::content(text), Envelope::Done],
                StreamState::Finished,
            )
        }
        Plan::NoInformation { mut debug } => {
            debug.finish(NO_INFO_MESSAGE, 0);
            let meta = Envelope::Metadata {
                source: AnswerSource::NoInformation,
                references: Vec::new(),
                debug,
            };
            (
                vec![meta, Envelope::content(NO_INFO_MESSAGE), Envelope::Done],
                StreamState::Finished,
            )
        }
        Plan::Generate {
            messages,
            candidates,
            config,
            debug,
        } => {
            let opened = engine.backend.stream(&messages, &config).await;
            let generation = Generation {
                engine,
                candidates: PreparedCandidates::new(&candidates),
                answer: String::new(),
                source: AnswerSource::KnowledgeBase,
                references: Vec::new(),
                debug,
            };
            match opened {
                Ok(fragments) => (
                    vec![generation.metadata()],
                    StreamState::Streaming {
                        fragments,
                        generation,
                    },
                ),
                Err(e) => (generation.fail(&e), StreamState::Finished),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Script {
        Reply(Vec<Result<Fragment, BackendError>>),
        Refuse,
    }

    struct MockBackend {
        script: Script,
        calls: AtomicUsize,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl MockBackend {
        fn replying(tokens: &[&str]) -> Arc<Self> {
            let mut items: Vec<Result<Fragment, BackendError>> = tokens
                .iter()
                .map(|t| Ok(Fragment::Token(t.to_string())))
                .collect();
            items.push(Ok(Fragment::Done));
            Self::scripted(items)
        }

        fn scripted(items: Vec<Result<Fragment, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Script::Reply(items),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                script: Script::Refuse,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn items(&self) -> Vec<Result<Fragment, BackendError>> {
            match &self.script {
                Script::Reply(items) => items
                    .iter()
                    .map(|i| match i {
                        Ok(f) => Ok(f.clone()),
                        Err(BackendError::Decode(s)) => Err(BackendError::Decode(s.clone())),
                        Err(_) => Err(BackendError::Timeout),
                    })
                    .collect(),
                Script::Refuse => Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = messages.to_vec();
            if let Script::Refuse = self.script {
                return Err(BackendError::Unreachable("connection refused".to_string()));
            }
            let mut text = String::new();
            for item in self.items() {
                if let Ok(Fragment::Token(t)) = item {
                    text.push_str(&t);
                }
            }
            Ok(text)
        }

        async fn stream(
            &self,
            messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> Result<FragmentStream, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = messages.to_vec();
            if let Script::Refuse = self.script {
                return Err(BackendError::Unreachable("connection refused".to_string()));
            }
            Ok(stream::iter(self.items()).boxed())
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["mock-model".to_string()])
        }
    }

    fn password_store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_documents(vec![Document {
            id: "pw".to_string(),
            title: "Password Reset Policy".to_string(),
            url: "https://example.com/pw".to_string(),
            body: "You must reset your password within 24 hours of a security alert."
                .to_string(),
            crawled_at: Utc::now(),
        }]))
    }

    fn engine(store: Arc<InMemoryStore>, backend: Arc<MockBackend>) -> Orchestrator {
        Orchestrator::new(store, backend, EngineSettings::default())
    }

    async fn collect(engine: &Orchestrator, message: &str) -> Vec<Envelope> {
        engine.answer_stream(ChatRequest::new(message)).collect().await
    }

    fn contents(envelopes: &[Envelope]) -> Vec<String> {
        envelopes
            .iter()
            .filter_map(|e| match e {
                Envelope::Content { content } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    fn last_metadata(envelopes: &[Envelope]) -> (AnswerSource, Vec<Reference>) {
        envelopes
            .iter()
            .rev()
            .find_map(|e| match e {
                Envelope::Metadata {
                    source, references, ..
                } => Some((*source, references.clone())),
                _ => None,
            })
            .unwrap()
    }

    fn assert_single_done_last(envelopes: &[Envelope]) {
        assert_eq!(envelopes.last(), Some(&Envelope::Done));
        assert_eq!(envelopes.iter().filter(|e| **e == Envelope::Done).count(), 1);
    }

    #[tokio::test]
    async fn test_predefined_greeting_bypasses_search() {
        let backend = MockBackend::replying(&["unused"]);
        let e = engine(password_store(), backend.clone());

        let envelopes = collect(&e, "hello").await;
        assert_single_done_last(&envelopes);
        assert_eq!(contents(&envelopes).len(), 1);
        assert_eq!(last_metadata(&envelopes).0, AnswerSource::Predefined);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let single = e.answer(&ChatRequest::new("hello")).await;
        assert_eq!(single.source, AnswerSource::Predefined);
        assert_eq!(single.debug.results_count, 0);
    }

    #[tokio::test]
    async fn test_empty_store_answers_no_information_without_backend() {
        let backend = MockBackend::replying(&["unused"]);
        let e = engine(Arc::new(InMemoryStore::new()), backend.clone());

        let envelopes = collect(&e, "how do I reset my password").await;
        assert_single_done_last(&envelopes);
        assert_eq!(contents(&envelopes), vec![NO_INFO_MESSAGE.to_string()]);
        assert_eq!(last_metadata(&envelopes).0, AnswerSource::NoInformation);

        let single = e.answer(&ChatRequest::new("how do I reset my password")).await;
        assert_eq!(single.response, NO_INFO_MESSAGE);
        assert_eq!(single.source, AnswerSource::NoInformation);
        assert!(!single.debug.has_relevant_info);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_password_scenario_streams_with_reference() {
        let backend = MockBackend::replying(&["You should ", "reset your password", " within 24 hours."]);
        let e = engine(password_store(), backend.clone());

        let envelopes = collect(&e, "how do I reset my password").await;
        assert_single_done_last(&envelopes);
        assert_eq!(
            contents(&envelopes).concat(),
            "You should reset your password within 24 hours."
        );
        let (source, refs) = last_metadata(&envelopes);
        assert_eq!(source, AnswerSource::KnowledgeBase);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "https://example.com/pw");
        assert!(matches!(envelopes[0], Envelope::Metadata { .. }));

        let sent = backend.seen.lock().unwrap().clone();
        assert!(sent[0].content.contains("Source: Password Reset Policy (https://example.com/pw)"));
        assert_eq!(sent.last().unwrap().content, "how do I reset my password");
    }

    #[tokio::test]
    async fn test_single_shot_attributes_references() {
        let backend = MockBackend::replying(&["Reset your password within 24 hours."]);
        let e = engine(password_store(), backend);
        let response = e.answer(&ChatRequest::new("how do I reset my password")).await;
        assert_eq!(response.source, AnswerSource::KnowledgeBase);
        assert_eq!(response.references.len(), 1);
        assert_eq!(response.debug.references_used, 1);
        assert_eq!(response.debug.model.as_deref(), Some("gemma3:1b"));
    }

    #[tokio::test]
    async fn test_model_no_info_answer_suppresses_references() {
        let backend = MockBackend::replying(&["Password Reset Policy: ", NO_INFO_MESSAGE]);
        let e = engine(password_store(), backend);

        let envelopes = collect(&e, "how do I reset my password").await;
        let (source, refs) = last_metadata(&envelopes);
        assert_eq!(source, AnswerSource::NoInformation);
        assert!(refs.is_empty());

        let single = e.answer(&ChatRequest::new("how do I reset my password")).await;
        assert_eq!(single.source, AnswerSource::NoInformation);
        assert!(single.references.is_empty());
    }

    #[tokio::test]
    async fn test_connection_error_yields_apology_and_done() {
        let backend = MockBackend::refusing();
        let e = engine(password_store(), backend);

        let envelopes = collect(&e, "how do I reset my password").await;
        assert_single_done_last(&envelopes);
        assert_eq!(contents(&envelopes), vec![APOLOGY_MESSAGE.to_string()]);
        assert_eq!(last_metadata(&envelopes).0, AnswerSource::Error);

        let single = e.answer(&ChatRequest::new("how do I reset my password")).await;
        assert_eq!(single.response, APOLOGY_MESSAGE);
        assert_eq!(single.source, AnswerSource::Error);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_still_terminates() {
        let backend = MockBackend::scripted(vec![
            Ok(Fragment::Token("Reset ".to_string())),
            Err(BackendError::Timeout),
            Ok(Fragment::Token("never seen".to_string())),
        ]);
        let e = engine(password_store(), backend);

        let envelopes = collect(&e, "how do I reset my password").await;
        assert_single_done_last(&envelopes);
        assert_eq!(
            contents(&envelopes),
            vec!["Reset ".to_string(), APOLOGY_MESSAGE.to_string()]
        );
    }

    #[tokio::test]
    async fn test_malformed_fragments_are_skipped() {
        let backend = MockBackend::scripted(vec![
            Ok(Fragment::Token("Reset ".to_string())),
            Err(BackendError::Decode("{not json".to_string())),
            Ok(Fragment::Token("your password.".to_string())),
            Ok(Fragment::Done),
        ]);
        let e = engine(password_store(), backend);

        let envelopes = collect(&e, "how do I reset my password").await;
        assert_single_done_last(&envelopes);
        assert_eq!(contents(&envelopes).concat(), "Reset your password.");
    }

    #[tokio::test]
    async fn test_stream_without_done_marker_still_completes() {
        let backend = MockBackend::scripted(vec![Ok(Fragment::Token("Reset it.".to_string()))]);
        let e = engine(password_store(), backend);
        let envelopes = collect(&e, "how do I reset my password").await;
        assert_single_done_last(&envelopes);
    }

    #[test]
    fn test_envelope_wire_format() {
        let done = serde_json::to_value(Envelope::Done).unwrap();
        assert_eq!(done, serde_json::json!({"type": "done"}));

        let content = serde_json::to_value(Envelope::content("hi")).unwrap();
        assert_eq!(content, serde_json::json!({"type": "content", "content": "hi"}));

        let meta = serde_json::to_value(Envelope::Metadata {
            source: AnswerSource::KnowledgeBase,
            references: vec![],
            debug: DebugInfo::default(),
        })
        .unwrap();
        assert_eq!(meta["type"], "metadata");
        assert_eq!(meta["source"], "knowledge_base");
        assert!(meta["debug"]["resultsCount"].is_number());
    }

    #[test]
    fn test_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(req.history.is_empty());
        assert!(req.config.is_none());
    }

    #[test]
    fn test_missing_message_deserializes_empty() {
        let req: ChatRequest = serde_json::from_str(r#"{"history":[]}"#).unwrap();
        assert!(req.message.is_empty());
    }

    struct DropFlag(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Sends one token, then stalls until dropped.
    struct StallingBackend {
        dropped: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl ChatBackend for StallingBackend {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> Result<String, BackendError> {
            Err(BackendError::Timeout)
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> Result<FragmentStream, BackendError> {
            let guard = DropFlag(self.dropped.clone());
            let first = stream::iter(vec![Ok(Fragment::Token("Reset ".to_string()))]);
            Ok(first
                .chain(stream::pending())
                .map(move |item| {
                    let _held = &guard;
                    item
                })
                .boxed())
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_dropping_envelope_stream_drops_backend_stream() {
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let backend = Arc::new(StallingBackend {
            dropped: dropped.clone(),
        });
        let e = Orchestrator::new(password_store(), backend, EngineSettings::default());

        let mut envelopes = e.answer_stream(ChatRequest::new("how do I reset my password"));
        assert!(matches!(envelopes.next().await, Some(Envelope::Metadata { .. })));
        let mut saw_content = false;
        while let Some(envelope) = envelopes.next().await {
            if let Envelope::Content { content } = envelope {
                assert_eq!(content, "Reset ");
                saw_content = true;
                break;
            }
        }
        assert!(saw_content);
        assert!(!dropped.load(Ordering::SeqCst));

        drop(envelopes);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
