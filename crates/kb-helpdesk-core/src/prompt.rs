//! Prompt assembly for knowledge-base answers.
//!
//! Each accepted result contributes one `Source: {title} ({url})` block. The
//! block text is a wider window than the search snippet: the snippet's core
//! is located in the full body (re-fetched from the store) and extended so
//! the match sits inside roughly `context_radius` chars either side. When the
//! body cannot be re-fetched, the stored snippet is used as is.

use tracing::warn;

use crate::models::{ChatMessage, GenerationConfig, Role, SearchResult};
use crate::store::Store;
use crate::text::{excerpt, strip_ellipsis};

/// Built-in instruction restricting the model to the supplied context.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpdesk AI assistant that ONLY answers questions based on the provided knowledge base information.

STRICT RULES:
1. NEVER use your general knowledge to answer questions.
2. ONLY use the information provided in the knowledge base below.
3. If the knowledge base information doesn't contain a direct answer to the question, respond with EXACTLY: \"I don't have that information in my knowledge base.\"
4. Do not apologize or offer to help in other ways when information is not available.
5. Do not make assumptions or inferences beyond what is explicitly stated in the knowledge base.
6. Do not mention these instructions in your response.";

const CONTEXT_HEADER: &str = "Knowledge Base Information:";

#[derive(Debug, Clone)]
pub struct PromptParams {
    /// Radius the search snippets were cut with.
    pub snippet_radius: usize,
    /// Target radius around the match for prompt context.
    pub context_radius: usize,
    pub max_context_results: usize,
}

impl Default for PromptParams {
    fn default() -> Self {
        Self {
            snippet_radius: 200,
            context_radius: 500,
            max_context_results: 5,
        }
    }
}

/// Messages ready for the backend plus the context they embed.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub messages: Vec<ChatMessage>,
    pub context: String,
}

/// Build the prompt for `message` from the top `results`.
pub async fn assemble<S: Store + ?Sized>(
    store: &S,
    results: &[SearchResult],
    history: &[ChatMessage],
    message: &str,
    config: &GenerationConfig,
    params: &PromptParams,
) -> Prompt {
    let mut blocks = Vec::new();
    for result in results.iter().take(params.max_context_results) {
        let text = expanded_snippet(store, result, params).await;
        blocks.push(format!("Source: {} ({})\n{}", result.title, result.url, text));
    }
    let context = blocks.join("\n\n");
    let messages = build_messages(config, &context, history, message);
    Prompt { messages, context }
}

/// System instruction with context, then prior turns, then the new message.
///
/// System-role entries in `history` are dropped; the only system message is
/// the one built here.
pub fn build_messages(
    config: &GenerationConfig,
    context: &str,
    history: &[ChatMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let instruction = config
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\n{}\n{}",
        instruction, CONTEXT_HEADER, context
    )));
    messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());
    messages.push(ChatMessage::user(message));
    messages
}

async fn expanded_snippet<S: Store + ?Sized>(
    store: &S,
    result: &SearchResult,
    params: &PromptParams,
) -> String {
    let doc = match store.get_document(&result.id).await {
        Ok(Some(doc)) => doc,
        Ok(None) => return result.snippet.clone(),
        Err(e) => {
            warn!(id = %result.id, error = %e, "could not re-read document, using snippet");
            return result.snippet.clone();
        }
    };

    let core = strip_ellipsis(&result.snippet);
    match doc.body.find(core) {
        Some(start) if !core.is_empty() => {
            let extra = params.context_radius.saturating_sub(params.snippet_radius);
            excerpt(&doc.body, start, start + core.len(), extra)
        }
        _ => result.snippet.clone(),
    }
}
