use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kb_helpdesk_core::canned::{CannedAnswer, CannedAnswers};
use kb_helpdesk_core::chat::EngineSettings;
use kb_helpdesk_core::gate::{EmptyTermsPolicy, GatePolicy};
use kb_helpdesk_core::models::GenerationConfig;
use kb_helpdesk_core::prompt::PromptParams;
use kb_helpdesk_core::references::{Leniency, ReferencePolicy};
use kb_helpdesk_core::search::{KnowledgeSearch, SearchParams};
use kb_helpdesk_core::terms::{Stopwords, TermExtractor};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Canned answers; when absent the built-in greeting table is used.
    #[serde(default)]
    pub predefined: Option<Vec<CannedAnswer>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./knowledge-base")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "gemma3:1b".to_string()
}
fn default_temperature() -> f64 {
    0.01
}
fn default_top_p() -> f64 {
    0.9
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_snippet_radius")]
    pub snippet_radius: usize,
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,
    #[serde(default = "default_max_context_results")]
    pub max_context_results: usize,
    /// Replaces the built-in stopword list when set.
    #[serde(default)]
    pub stopwords: Option<Vec<String>>,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub references: ReferencesConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            snippet_radius: default_snippet_radius(),
            context_radius: default_context_radius(),
            max_context_results: default_max_context_results(),
            stopwords: None,
            gate: GateConfig::default(),
            references: ReferencesConfig::default(),
        }
    }
}

fn default_snippet_radius() -> usize {
    200
}
fn default_context_radius() -> usize {
    500
}
fn default_max_context_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    #[serde(default)]
    pub empty_terms: EmptyTermsPolicy,
    #[serde(default = "default_empty_terms_min_relevance")]
    pub empty_terms_min_relevance: f64,
    #[serde(default = "default_top_relevance")]
    pub top_relevance: f64,
    #[serde(default = "default_term_coverage")]
    pub term_coverage: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            empty_terms: EmptyTermsPolicy::default(),
            empty_terms_min_relevance: default_empty_terms_min_relevance(),
            top_relevance: default_top_relevance(),
            term_coverage: default_term_coverage(),
        }
    }
}

fn default_empty_terms_min_relevance() -> f64 {
    0.8
}
fn default_top_relevance() -> f64 {
    0.7
}
fn default_term_coverage() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReferencesConfig {
    #[serde(default)]
    pub leniency: Leniency,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_crawl_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub placeholder_on_error: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_crawl_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            placeholder_on_error: true,
        }
    }
}

fn default_crawl_timeout_secs() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    /// Knowledge search built from the `[retrieval]` section.
    pub fn knowledge_search(&self) -> KnowledgeSearch {
        let stopwords = match &self.retrieval.stopwords {
            Some(words) => Stopwords::new(words),
            None => Stopwords::default(),
        };
        KnowledgeSearch::new(
            TermExtractor::new(stopwords),
            SearchParams {
                snippet_radius: self.retrieval.snippet_radius,
            },
        )
    }

    /// Full orchestrator tunables.
    pub fn engine_settings(&self) -> EngineSettings {
        let gate = &self.retrieval.gate;
        EngineSettings {
            search: self.knowledge_search(),
            gate: GatePolicy {
                empty_terms: gate.empty_terms,
                empty_terms_min_relevance: gate.empty_terms_min_relevance,
                top_relevance: gate.top_relevance,
                term_coverage: gate.term_coverage,
            },
            prompt: PromptParams {
                snippet_radius: self.retrieval.snippet_radius,
                context_radius: self.retrieval.context_radius,
                max_context_results: self.retrieval.max_context_results,
            },
            references: ReferencePolicy {
                leniency: self.retrieval.references.leniency,
            },
            canned: match &self.predefined {
                Some(entries) => CannedAnswers::new(entries.clone()),
                None => CannedAnswers::default(),
            },
            generation: self.llm.generation(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate llm
    if config.llm.url.trim().is_empty() {
        anyhow::bail!("llm.url must not be empty");
    }
    if config.llm.model.trim().is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if !(config.llm.top_p > 0.0 && config.llm.top_p <= 1.0) {
        anyhow::bail!("llm.top_p must be in (0.0, 1.0]");
    }
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }

    // Validate retrieval
    if config.retrieval.snippet_radius == 0 {
        anyhow::bail!("retrieval.snippet_radius must be > 0");
    }
    if config.retrieval.context_radius == 0 {
        anyhow::bail!("retrieval.context_radius must be > 0");
    }
    if config.retrieval.max_context_results == 0 {
        anyhow::bail!("retrieval.max_context_results must be >= 1");
    }

    let gate = &config.retrieval.gate;
    for (name, value) in [
        ("empty_terms_min_relevance", gate.empty_terms_min_relevance),
        ("top_relevance", gate.top_relevance),
        ("term_coverage", gate.term_coverage),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("retrieval.gate.{} must be in [0.0, 1.0]", name);
        }
    }

    // Validate predefined answers
    if let Some(entries) = &config.predefined {
        for (i, entry) in entries.iter().enumerate() {
            if entry.triggers.iter().all(|t| t.trim().is_empty()) {
                anyhow::bail!("predefined[{}] must have at least one trigger", i);
            }
            if entry.response.trim().is_empty() {
                anyhow::bail!("predefined[{}].response must not be empty", i);
            }
        }
    }

    Ok(())
}
