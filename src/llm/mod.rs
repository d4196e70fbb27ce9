//! Language-model side of a turn: conversation memory, context assembly and
//! the streamed completion collaborator.
//!
//! * [`ConversationHistory`] — append-only session log with a `recent(n)` window.
//! * [`PromptBuilder`] — system instruction + recent window → request messages.
//! * [`CompletionService`] — async trait returning a [`CompletionStream`].
//! * [`ApiCompletion`] — OpenAI-compatible streaming backend (`async-openai`).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use voice_chat::config::AppConfig;
//! use voice_chat::llm::{
//!     ApiCompletion, CompletionParams, CompletionService, ConversationHistory, PromptBuilder,
//!     Role, StreamEvent,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let llm = ApiCompletion::from_config(&config.llm).unwrap();
//!     let history = ConversationHistory::new();
//!     history.push(Role::User, "こんにちは");
//!
//!     let messages = PromptBuilder::from_config(&config.history).build_messages(&history);
//!     let mut stream = llm
//!         .stream(&messages, &CompletionParams::from(&config.llm))
//!         .await
//!         .unwrap();
//!     while let Some(Ok(StreamEvent::Delta(text))) = stream.next().await {
//!         print!("{text}");
//!     }
//! }
//! ```

pub mod api;
pub mod completion;
pub mod history;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use api::ApiCompletion;
pub use completion::{
    CompletionParams, CompletionService, CompletionStream, StreamError, StreamEvent,
};
pub use history::{ConversationHistory, ConversationMessage, Role, DEFAULT_CONTEXT_WINDOW};
pub use prompt::{ChatMessage, ChatRole, PromptBuilder};
