//! Configuration module for the voice conversation core.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for the cross-platform config directory, and TOML persistence
//! via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, HistoryConfig, LlmConfig, PlaybackConfig, RetryConfig, SttConfig,
    TtsConfig, TtsProviderConfig, TurnConfig, VadConfig, DEFAULT_SYSTEM_PROMPT, MAX_RECORDING_SECS,
};
