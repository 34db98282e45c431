//! Predefined answers that bypass retrieval entirely.
//!
//! Lookup is on the normalised message: lowercased, trimmed, trailing
//! punctuation removed. Only exact trigger matches count, so "hello" hits
//! while "hello, my printer is broken" goes through search.

use serde::{Deserialize, Serialize};

/// One canned answer and the messages that trigger it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannedAnswer {
    pub triggers: Vec<String>,
    pub response: String,
}

#[derive(Debug, Clone)]
pub struct CannedAnswers {
    entries: Vec<CannedAnswer>,
}

impl CannedAnswers {
    pub fn new(entries: Vec<CannedAnswer>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| CannedAnswer {
                triggers: e.triggers.iter().map(|t| normalize(t)).collect(),
                response: e.response,
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn lookup(&self, message: &str) -> Option<&str> {
        let key = normalize(message);
        if key.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.triggers.iter().any(|t| *t == key))
            .map(|e| e.response.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CannedAnswers {
    fn default() -> Self {
        Self::new(vec![CannedAnswer {
            triggers: ["hello", "hi", "hey", "good morning", "good afternoon"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            response: "Hello! I'm the helpdesk assistant. Ask me anything covered by the \
                       knowledge base and I'll point you to the right page."
                .to_string(),
        }])
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_greeting() {
        let canned = CannedAnswers::default();
        assert!(canned.lookup("hello").is_some());
        assert!(canned.lookup("  Hello!  ").is_some());
        assert!(canned.lookup("hey?").is_some());
    }

    #[test]
    fn test_only_exact_triggers_match() {
        let canned = CannedAnswers::default();
        assert!(canned.lookup("hello, my printer is broken").is_none());
        assert!(canned.lookup("").is_none());
        assert!(canned.lookup("!!!").is_none());
    }

    #[test]
    fn test_custom_table() {
        let canned = CannedAnswers::new(vec![CannedAnswer {
            triggers: vec!["Opening Hours?".to_string()],
            response: "9 to 5.".to_string(),
        }]);
        assert_eq!(canned.lookup("opening hours"), Some("9 to 5."));
        assert!(canned.lookup("hello").is_none());
        assert!(CannedAnswers::empty().is_empty());
    }
}
