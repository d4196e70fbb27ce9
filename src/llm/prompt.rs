//! Context assembly for completion requests.
//!
//! [`PromptBuilder`] turns the conversation log into what a provider
//! consumes.  Two shapes are supported:
//!
//! * **Structured** ([`build_messages`](PromptBuilder::build_messages)) —
//!   `system` instruction followed by the recent window as role-tagged
//!   messages.  This is what the pipeline sends.
//! * **Flat** ([`render_transcript`](PromptBuilder::render_transcript)) —
//!   one prompt string with a past-context block, for providers that take a
//!   single text input.

use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::llm::history::{ConversationHistory, ConversationMessage, Role};

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of a completion request, in OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(m: &ConversationMessage) -> Self {
        let role = match m.role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: m.content.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds completion input from the system instruction and a bounded window
/// of history.
pub struct PromptBuilder {
    system_prompt: String,
    window: usize,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>, window: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            window,
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.system_prompt.clone(), config.context_window)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// `[system, recent(window)...]`.
    ///
    /// The caller appends the current user transcript to `history` first, so
    /// it is included exactly once as the last message.
    pub fn build_messages(&self, history: &ConversationHistory) -> Vec<ChatMessage> {
        let recent = history.recent(self.window);
        let mut messages = Vec::with_capacity(recent.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(recent.iter().map(ChatMessage::from));
        messages
    }

    /// Flat prompt: instruction, past context, then the current user line.
    ///
    /// `history` should *not* yet contain `user_message`.
    ///
    /// ```text
    /// <system prompt>
    ///
    /// 過去の会話の文脈:
    /// ユーザー: …
    /// アシスタント: …
    ///
    /// 現在の会話:
    /// ユーザー: <user_message>
    /// ```
    pub fn render_transcript(&self, history: &ConversationHistory, user_message: &str) -> String {
        let recent = history.recent(self.window);
        if recent.is_empty() {
            return format!("{}\n\nユーザー: {user_message}", self.system_prompt);
        }

        let context = recent
            .iter()
            .map(|m| format!("{}: {}", speaker(m.role), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{}\n\n過去の会話の文脈:\n{context}\n\n現在の会話:\nユーザー: {user_message}",
            self.system_prompt
        )
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "ユーザー",
        Role::Assistant => "アシスタント",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
