//! Core data models shared by the retrieval engine and the application shell.
//!
//! [`Document`]s are owned by a [`Store`](crate::store::Store) and never
//! change once crawled. [`SearchResult`]s and [`Reference`]s are derived per
//! query and discarded after the answer has been delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A crawled page as held by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable handle used to re-fetch the body (the store's file stem).
    pub id: String,
    pub title: String,
    pub url: String,
    /// Plain text, HTML already stripped.
    pub body: String,
    pub crawled_at: DateTime<Utc>,
}

impl Document {
    /// Documents with no usable text never take part in search.
    pub fn is_searchable(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// One ranked hit produced by knowledge search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Excerpt around the earliest term match, `...`-marked where clipped.
    pub snippet: String,
    /// Relevance in `[0.0, 1.0]`.
    pub relevance: f64,
}

impl SearchResult {
    pub fn reference(&self) -> Reference {
        Reference {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }

    /// Lowercased `title + " " + snippet`, the text the relevance gate inspects.
    pub(crate) fn gate_text(&self) -> String {
        format!("{} {}", self.title, self.snippet).to_lowercase()
    }
}

/// A source surfaced to the end user alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

/// Conversation role of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    KnowledgeBase,
    NoInformation,
    Predefined,
    Error,
}

/// Generation parameters for one request. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    /// Replaces the built-in strict instruction when set.
    pub system_prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemma3:1b".to_string(),
            temperature: 0.01,
            top_p: 0.9,
            max_tokens: 1000,
            system_prompt: None,
        }
    }
}

impl GenerationConfig {
    /// Layer per-request overrides on top of these defaults.
    pub fn with_overrides(&self, overrides: &GenerationOverrides) -> GenerationConfig {
        GenerationConfig {
            model: overrides
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.model.clone()),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
            system_prompt: overrides
                .system_prompt
                .clone()
                .filter(|p| !p.trim().is_empty())
                .or_else(|| self.system_prompt.clone()),
        }
    }
}

/// Client-supplied generation settings; absent fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOverrides {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_present_fields() {
        let defaults = GenerationConfig::default();
        let overrides = GenerationOverrides {
            temperature: Some(0.5),
            max_tokens: Some(64),
            ..Default::default()
        };
        let resolved = defaults.with_overrides(&overrides);
        assert_eq!(resolved.model, "gemma3:1b");
        assert!((resolved.temperature - 0.5).abs() < 1e-9);
        assert!((resolved.top_p - 0.9).abs() < 1e-9);
        assert_eq!(resolved.max_tokens, 64);
        assert!(resolved.system_prompt.is_none());
    }

    #[test]
    fn test_blank_override_strings_are_ignored() {
        let defaults = GenerationConfig {
            system_prompt: Some("base".to_string()),
            ..Default::default()
        };
        let overrides = GenerationOverrides {
            model: Some("  ".to_string()),
            system_prompt: Some(String::new()),
            ..Default::default()
        };
        let resolved = defaults.with_overrides(&overrides);
        assert_eq!(resolved.model, "gemma3:1b");
        assert_eq!(resolved.system_prompt.as_deref(), Some("base"));
    }

    #[test]
    fn test_overrides_deserialize_camel_case() {
        let json = r#"{"model":"llama3:8b","topP":0.5,"maxTokens":10,"systemPrompt":"x"}"#;
        let o: GenerationOverrides = serde_json::from_str(json).unwrap();
        assert_eq!(o.model.as_deref(), Some("llama3:8b"));
        assert_eq!(o.top_p, Some(0.5));
        assert_eq!(o.max_tokens, Some(10));
        assert_eq!(o.system_prompt.as_deref(), Some("x"));
        assert!(o.temperature.is_none());
    }

    #[test]
    fn test_answer_source_wire_names() {
        assert_eq!(
            serde_json::to_string(&AnswerSource::KnowledgeBase).unwrap(),
            "\"knowledge_base\""
        );
        assert_eq!(
            serde_json::to_string(&AnswerSource::NoInformation).unwrap(),
            "\"no_information\""
        );
    }
}
