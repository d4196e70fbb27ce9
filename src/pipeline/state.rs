//! Turn state machine and shared session state.
//!
//! [`TurnState`] is driven by the [`TurnController`](super::TurnController).
//! A host UI reads it, together with the transcript and the streaming reply,
//! through [`SharedState`].
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<SessionState>>`: cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// States of the conversation turn controller.
///
/// ```text
/// Idle ──start_listening──▶ Listening
///      Listening ──SpeechStarted──▶ Recording
///      Recording ──SpeechEnded + settle──▶ Processing
///      Processing ──playback begins──▶ Speaking
///      Speaking / Processing ──run finished──▶ Listening
/// Processing / Speaking ──SpeechStarted (barge-in)──▶ Recording
/// any ──stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Not listening to the microphone.
    #[default]
    Idle,

    /// Microphone open, waiting for speech.
    Listening,

    /// The user is speaking; audio is being captured.
    Recording,

    /// Transcription and completion are running.
    Processing,

    /// Assistant audio is playing.
    Speaking,
}

impl TurnState {
    /// `true` while a pipeline run owns the turn.
    ///
    /// ```
    /// use voice_chat::pipeline::TurnState;
    ///
    /// assert!(!TurnState::Listening.is_busy());
    /// assert!(TurnState::Processing.is_busy());
    /// assert!(TurnState::Speaking.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, TurnState::Processing | TurnState::Speaking)
    }

    /// A speech onset in this state interrupts the assistant.
    pub fn accepts_barge_in(&self) -> bool {
        self.is_busy()
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnState::Idle => "Idle",
            TurnState::Listening => "Listening",
            TurnState::Recording => "Recording",
            TurnState::Processing => "Thinking",
            TurnState::Speaking => "Speaking",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// What a host UI needs to render the conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub turn: TurnState,

    /// Transcript of the most recent user utterance.
    pub last_transcript: Option<String>,

    /// Reply text streamed so far for the active run.  Cleared on barge-in.
    pub partial_reply: String,

    /// The last reply that completed.
    pub last_reply: Option<String>,

    /// Message of the last surfaced error.  Cleared when recording starts.
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].  Do not hold the lock across an
/// `.await`.
pub type SharedState = Arc<Mutex<SessionState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(SessionState::default()))
}

/// Lock `state`, recovering from a poisoned mutex.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_processing_and_speaking_are_busy() {
        assert!(!TurnState::Idle.is_busy());
        assert!(!TurnState::Listening.is_busy());
        assert!(!TurnState::Recording.is_busy());
        assert!(TurnState::Processing.is_busy());
        assert!(TurnState::Speaking.is_busy());
    }

    #[test]
    fn barge_in_only_interrupts_a_reply() {
        assert!(!TurnState::Recording.accepts_barge_in());
        assert!(TurnState::Processing.accepts_barge_in());
        assert!(TurnState::Speaking.accepts_barge_in());
    }

    #[test]
    fn labels() {
        assert_eq!(TurnState::Idle.label(), "Idle");
        assert_eq!(TurnState::Processing.label(), "Thinking");
        assert_eq!(TurnState::Speaking.label(), "Speaking");
    }

    #[test]
    fn default_is_idle() {
        assert_eq!(TurnState::default(), TurnState::Idle);
        assert_eq!(SessionState::default().turn, TurnState::Idle);
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_clones_share_data() {
        let state = new_shared_state();
        let other = Arc::clone(&state);
        lock_state(&state).turn = TurnState::Recording;
        assert_eq!(lock_state(&other).turn, TurnState::Recording);
    }
}
