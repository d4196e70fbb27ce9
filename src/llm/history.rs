//! Session-scoped conversation log.
//!
//! [`ConversationHistory`] is an append-only, ordered record of every user
//! transcript and assistant reply in the current session.  Storage is
//! unbounded; what the model sees is bounded by [`recent`](ConversationHistory::recent),
//! which returns the last *n* messages oldest-first.
//!
//! The store is a cheap-to-clone handle (`Arc<RwLock<..>>`).  Appends take the
//! write lock for one `push`, reads clone a slice under the read lock, so a
//! reader always sees a consistent prefix and never a half-written message.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages injected as context by default.
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;

const TITLE_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// ConversationMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One half of a turn.  Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ---------------------------------------------------------------------------
// ConversationHistory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Log {
    messages: Vec<ConversationMessage>,
    title: Option<String>,
}

/// Shared, append-only conversation log.
///
/// ```rust
/// use voice_chat::llm::{ConversationHistory, ConversationMessage};
///
/// let history = ConversationHistory::new();
/// history.append(ConversationMessage::user("こんにちは"));
/// history.append(ConversationMessage::assistant("こんにちは！"));
///
/// let recent = history.recent(10);
/// assert_eq!(recent.len(), 2);
/// assert_eq!(recent[0].content, "こんにちは");
/// ```
#[derive(Clone, Default)]
pub struct ConversationHistory {
    inner: Arc<RwLock<Log>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Log> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Log> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message.  The first user message also names the
    /// conversation.
    pub fn append(&self, message: ConversationMessage) {
        let mut log = self.write();
        if log.title.is_none() && message.role == Role::User {
            log.title = Some(make_title(&message.content));
        }
        log.messages.push(message);
    }

    /// Shorthand for `append(ConversationMessage::new(role, content))`.
    pub fn push(&self, role: Role, content: impl Into<String>) {
        self.append(ConversationMessage::new(role, content));
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ConversationMessage> {
        let log = self.read();
        let start = log.messages.len().saturating_sub(n);
        log.messages[start..].to_vec()
    }

    /// Every message, oldest first.
    pub fn snapshot(&self) -> Vec<ConversationMessage> {
        self.read().messages.clone()
    }

    /// Remove every message and forget the title.
    pub fn clear(&self) {
        let mut log = self.write();
        log.messages.clear();
        log.title = None;
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    /// Title derived from the first user message (first 50 characters).
    pub fn title(&self) -> Option<String> {
        self.read().title.clone()
    }
}

fn make_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
