//! Streaming completion contract.
//!
//! A [`CompletionService`] takes an ordered message list and returns a
//! [`CompletionStream`] of text fragments ending in [`StreamEvent::Done`].
//! Opening the stream is a single fallible call (and is what the pipeline
//! retries); once open, fragments arrive one by one and a bad payload ends
//! the stream rather than the turn.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::prompt::ChatMessage;
use crate::provider::ProviderError;

// ---------------------------------------------------------------------------
// StreamEvent / StreamError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next text fragment, in arrival order.
    Delta(String),
    /// Explicit end-of-stream marker.
    Done,
}

/// Failure inside an already-open stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A payload that could not be understood.
    #[error("malformed stream payload: {0}")]
    Decode(String),

    /// The provider reported an error or the connection dropped.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type CompletionStream = BoxStream<'static, Result<StreamEvent, StreamError>>;

// ---------------------------------------------------------------------------
// CompletionParams
// ---------------------------------------------------------------------------

/// Model parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for CompletionParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

// ---------------------------------------------------------------------------
// CompletionService
// ---------------------------------------------------------------------------

/// Incremental text generation.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn CompletionService>`.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<CompletionStream, ProviderError>;
}
