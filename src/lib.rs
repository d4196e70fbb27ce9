//! Voice conversation core: hands-free turn-taking with barge-in over
//! pluggable speech-to-text, streamed completion and text-to-speech
//! collaborators.
//!
//! * [`audio`] — capture, level metering, voice activity detection, playback.
//! * [`pipeline`] — turn controller, per-turn orchestrator, retry, timing.
//! * [`llm`] / [`stt`] / [`tts`] — collaborator traits and HTTP adapters.
//! * [`config`] — TOML settings.

pub mod audio;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod provider;
pub mod stt;
pub mod tts;
