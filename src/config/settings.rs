//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section uses `#[serde(default)]`, so a partial `settings.toml` only
//! needs to mention the values it overrides.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::provider::resolve_api_key;

/// Instruction prepended to every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "あなたは親しみやすい日本語AIアシスタントです。自然で丁寧な日本語で会話してください。";

// ---------------------------------------------------------------------------
// VadConfig
// ---------------------------------------------------------------------------

/// Amplitude thresholds for voice-activity detection.
///
/// Levels are normalised to `[0.0, 1.0]` by the [`LevelMeter`].  Anything
/// between the two thresholds is the *ambiguous* band: it keeps the current
/// speaking state but restarts the end-of-turn silence timer.
///
/// [`LevelMeter`]: crate::audio::LevelMeter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Level at or above which a frame counts as speech.
    pub speech_threshold: f32,
    /// Level at or below which a frame counts toward end-of-turn silence.
    pub silence_threshold: f32,
    /// Milliseconds of uninterrupted silence that end a speech segment.
    pub silence_duration_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.02,
            silence_threshold: 0.01,
            silence_duration_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// TurnConfig
// ---------------------------------------------------------------------------

/// Turn-taking behaviour of the [`TurnController`](crate::pipeline::TurnController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Delay after end-of-speech before the utterance is committed, so the
    /// capture path can flush its last buffered frames.
    pub settle_delay_ms: u64,
    /// Audio kept from just before speech onset, in milliseconds.
    pub pre_roll_ms: u64,
    /// Recordings longer than this are committed automatically.
    pub max_recording_secs: f32,
}

/// Upper bound for `turn.max_recording_secs`; the recorder is allocated
/// for the full limit up front.
pub const MAX_RECORDING_SECS: f32 = 300.0;

impl TurnConfig {
    /// `max_recording_secs` as a usable limit: out-of-range values fall back
    /// to the default and large ones are capped at [`MAX_RECORDING_SECS`].
    pub fn recording_limit_secs(&self) -> f32 {
        let secs = self.max_recording_secs;
        if secs.is_finite() && secs > 0.0 {
            secs.min(MAX_RECORDING_SECS)
        } else {
            Self::default().max_recording_secs
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 300,
            pre_roll_ms: 300,
            max_recording_secs: 30.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture format and level-metering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate the recorder and transcription path work at.
    pub sample_rate: u32,
    /// Samples per analysis frame fed to the level meter.
    pub frame_size: usize,
    /// Per-bin smoothing time constant (0.0 – 1.0).
    pub smoothing: f32,
    /// Magnitude (dB) mapped to level 0.
    pub min_decibels: f32,
    /// Magnitude (dB) mapped to level 1.
    pub max_decibels: f32,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            input_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Backoff applied to every provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

/// Context injected into completion requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of recent messages sent with every request.
    pub context_window: usize,
    pub system_prompt: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            context_window: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Remote transcription provider (OpenAI-compatible
/// `/v1/audio/transcriptions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub base_url: String,
    /// Explicit key; takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the key.
    pub api_key_env: Option<String>,
    pub model: String,
    /// ISO-639-1 language hint.
    pub language: String,
    pub timeout_secs: u64,
}

impl SttConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".into(),
            api_key: None,
            api_key_env: Some("GROQ_API_KEY".into()),
            model: "whisper-large-v3".into(),
            language: "ja".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Remote completion provider (OpenAI-compatible `/v1/chat/completions`
/// with `stream: true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the API endpoint.
    ///
    /// - Groq: `https://api.groq.com/openai`
    /// - OpenAI: `https://api.openai.com`
    /// - Ollama: `http://localhost:11434`
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub model: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f32,
    pub max_tokens: u32,
    /// Seconds allowed for connecting and for each gap between streamed
    /// fragments.
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".into(),
            api_key: None,
            api_key_env: Some("GROQ_API_KEY".into()),
            model: "llama-3.1-8b-instant".into(),
            temperature: 0.7,
            max_tokens: 512,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// One speech-synthesis provider (OpenAI-compatible `/v1/audio/speech`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub model: String,
    pub voice: String,
    /// Container format requested from the provider (`mp3`, `wav`, …).
    pub format: String,
    pub timeout_secs: u64,
}

impl TtsProviderConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

impl Default for TtsProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".into()),
            model: "tts-1".into(),
            voice: "alloy".into(),
            format: "mp3".into(),
            timeout_secs: 30,
        }
    }
}

/// Primary synthesis provider plus an optional fallback tried when the
/// primary fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub primary: TtsProviderConfig,
    pub fallback: Option<TtsProviderConfig>,
    /// Speaking-rate multiplier sent with every request (0.25 – 4.0).
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            primary: TtsProviderConfig::default(),
            fallback: None,
            speed: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// External player used for assistant audio.  The synthesized bytes are
/// written to the process's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "mpv".into(),
                "--no-terminal".into(),
                "--really-quiet".into(),
                "-".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_chat::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vad: VadConfig,
    pub turn: TurnConfig,
    pub audio: AudioConfig,
    pub retry: RetryConfig,
    pub history: HistoryConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject combinations the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        let vad = &self.vad;
        for (name, value) in [
            ("speech_threshold", vad.speech_threshold),
            ("silence_threshold", vad.silence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("vad.{name} must be within [0, 1], got {value}");
            }
        }
        if vad.silence_threshold > vad.speech_threshold {
            bail!(
                "vad.silence_threshold ({}) must not exceed vad.speech_threshold ({})",
                vad.silence_threshold,
                vad.speech_threshold
            );
        }

        let retry = &self.retry;
        if retry.multiplier < 1.0 {
            bail!("retry.multiplier must be >= 1, got {}", retry.multiplier);
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            bail!(
                "retry.initial_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                retry.initial_delay_ms,
                retry.max_delay_ms
            );
        }

        let max_secs = self.turn.max_recording_secs;
        if !max_secs.is_finite() || max_secs <= 0.0 || max_secs > MAX_RECORDING_SECS {
            bail!(
                "turn.max_recording_secs must be within (0, {MAX_RECORDING_SECS}], got {max_secs}"
            );
        }

        if !(0.25..=4.0).contains(&self.tts.speed) {
            bail!("tts.speed must be within [0.25, 4], got {}", self.tts.speed);
        }

        if self.history.context_window == 0 {
            bail!("history.context_window must be at least 1");
        }
        if self.audio.frame_size == 0 || self.audio.sample_rate == 0 {
            bail!("audio.frame_size and audio.sample_rate must be non-zero");
        }
        if self.audio.min_decibels >= self.audio.max_decibels {
            bail!("audio.min_decibels must be below audio.max_decibels");
        }
        if self.playback.command.is_empty() {
            bail!("playback.command must name a program");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
