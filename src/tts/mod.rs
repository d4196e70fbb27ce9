//! Speech-synthesis collaborator.
//!
//! * [`Synthesizer`] — async trait: text + [`VoiceParams`] → playable bytes.
//! * [`ApiSynthesizer`] — OpenAI-compatible `/v1/audio/speech` backend.
//! * [`FallbackSynthesizer`] — primary → secondary provider behind one
//!   `synthesize` call.

pub mod api;
pub mod fallback;

use async_trait::async_trait;

use crate::config::TtsConfig;
use crate::provider::ProviderError;

pub use api::ApiSynthesizer;
pub use fallback::FallbackSynthesizer;

/// Per-request voice settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    /// Voice override; `None` uses the provider's configured voice.
    pub voice: Option<String>,
    /// Playback speed multiplier.
    pub speed: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: None,
            speed: 1.0,
        }
    }
}

impl From<&TtsConfig> for VoiceParams {
    fn from(config: &TtsConfig) -> Self {
        Self {
            voice: None,
            speed: config.speed,
        }
    }
}

/// Object-safe, thread-safe text-to-speech interface.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>, ProviderError>;
}

/// Build the configured synthesizer, wrapping it in a
/// [`FallbackSynthesizer`] when a fallback provider is configured.
pub fn from_config(config: &TtsConfig) -> Result<Box<dyn Synthesizer>, ProviderError> {
    let primary = ApiSynthesizer::from_config(&config.primary)?;
    match &config.fallback {
        Some(fallback) => Ok(Box::new(FallbackSynthesizer::new(
            primary,
            ApiSynthesizer::from_config(fallback)?,
        ))),
        None => Ok(Box::new(primary)),
    }
}
