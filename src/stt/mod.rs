//! Speech-to-text collaborator.
//!
//! The pipeline hands a finished utterance to a [`Transcriber`] as an
//! encoded [`AudioClip`] plus a language hint and gets plain text back.  An
//! empty transcript is a valid answer ("nothing recognised"), not an error.
//!
//! [`ApiTranscriber`] talks to any OpenAI-compatible
//! `/v1/audio/transcriptions` endpoint.

pub mod api;

use async_trait::async_trait;

use crate::audio::{encode_pcm16, WAV_MIME};
use crate::config::SttConfig;
use crate::provider::ProviderError;

pub use api::ApiTranscriber;

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// Encoded audio ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub data: Vec<u8>,
    /// MIME type of `data`, e.g. `audio/wav`.
    pub mime_type: String,
    pub sample_rate: u32,
    /// Length of the recorded audio.
    pub duration_secs: f32,
}

impl AudioClip {
    /// Wrap mono PCM samples as a 16-bit WAV clip.
    pub fn from_pcm(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: encode_pcm16(samples, sample_rate),
            mime_type: WAV_MIME.into(),
            sample_rate,
            duration_secs: if sample_rate == 0 {
                0.0
            } else {
                samples.len() as f32 / sample_rate as f32
            },
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/webm" => "webm",
            "audio/mpeg" => "mp3",
            "audio/ogg" => "ogg",
            _ => "bin",
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    /// ISO-639-1 language hint.
    pub language: String,
}

impl From<&SttConfig> for TranscribeOptions {
    fn from(config: &SttConfig) -> Self {
        Self {
            language: config.language.clone(),
        }
    }
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self::from(&SttConfig::default())
    }
}

/// Object-safe, thread-safe speech-to-text interface.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        options: &TranscribeOptions,
    ) -> Result<String, ProviderError>;
}
