//! Fallback synthesizer — tries a primary provider, then a secondary one.
//!
//! Provider fallback is an orchestration concern that the pipeline never
//! sees: [`FallbackSynthesizer`] is itself a [`Synthesizer`], so the
//! orchestrator makes one logical `synthesize` call either way.

use async_trait::async_trait;

use super::{Synthesizer, VoiceParams};
use crate::provider::ProviderError;

// ---------------------------------------------------------------------------
// FallbackSynthesizer
// ---------------------------------------------------------------------------

/// Wraps two synthesizers; the secondary is only called when the primary
/// fails.  When both fail the secondary's error is returned.
///
/// # Example
/// ```rust
/// use voice_chat::config::TtsProviderConfig;
/// use voice_chat::tts::{ApiSynthesizer, FallbackSynthesizer};
///
/// let cloud = ApiSynthesizer::from_config(&TtsProviderConfig::default()).unwrap();
/// let local = ApiSynthesizer::from_config(&TtsProviderConfig {
///     base_url: "http://localhost:8880".into(),
///     ..TtsProviderConfig::default()
/// })
/// .unwrap();
/// let tts = FallbackSynthesizer::new(cloud, local);
/// ```
pub struct FallbackSynthesizer<P: Synthesizer, S: Synthesizer> {
    primary: P,
    secondary: S,
}

impl<P: Synthesizer, S: Synthesizer> FallbackSynthesizer<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

#[async_trait]
impl<P: Synthesizer, S: Synthesizer> Synthesizer for FallbackSynthesizer<P, S> {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>, ProviderError> {
        match self.primary.synthesize(text, params).await {
            Ok(audio) => Ok(audio),
            Err(err) => {
                log::warn!("tts: primary provider failed ({err}), trying fallback");
                self.secondary.synthesize(text, params).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
