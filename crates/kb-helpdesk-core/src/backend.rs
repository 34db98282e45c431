//! Language-model backend abstraction.
//!
//! A backend turns role-tagged messages into text, either in one call or as
//! a pull-based [`FragmentStream`]. Dropping the stream tears down whatever
//! connection feeds it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::{ChatMessage, GenerationConfig};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("language model backend unreachable: {0}")]
    Unreachable(String),

    #[error("language model backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model backend timed out")]
    Timeout,

    /// The backend answered but reported a failure of its own.
    #[error("language model error: {0}")]
    Model(String),

    /// One unparseable piece of output. Streams skip these and carry on.
    #[error("malformed backend output: {0}")]
    Decode(String),
}

/// One item of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Token(String),
    Done,
}

pub type FragmentStream = BoxStream<'static, Result<Fragment, BackendError>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short provider name, e.g. `"ollama"`.
    fn name(&self) -> &str;

    /// Full completion in one call.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String, BackendError>;

    /// Incremental completion. Errors before the first fragment are returned
    /// here; later failures arrive as stream items.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError>;

    async fn list_models(&self) -> Result<Vec<String>, BackendError>;
}
