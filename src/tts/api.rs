//! `ApiSynthesizer` — OpenAI-compatible `/v1/audio/speech` endpoint
//! (OpenAI, Kokoro-FastAPI, LocalAI …).

use async_trait::async_trait;

use super::{Synthesizer, VoiceParams};
use crate::config::TtsProviderConfig;
use crate::provider::{check_status, http_client, ProviderError, ProviderErrorKind};

pub struct ApiSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    format: String,
}

impl ApiSynthesizer {
    pub fn from_config(config: &TtsProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            format: config.format.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.base_url)
    }

    fn request_body(&self, text: &str, params: &VoiceParams) -> serde_json::Value {
        serde_json::json!({
            "model":           self.model,
            "input":           text,
            "voice":           params.voice.as_deref().unwrap_or(&self.voice),
            "response_format": self.format,
            "speed":           params.speed,
        })
    }
}

#[async_trait]
impl Synthesizer for ApiSynthesizer {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::new(ProviderErrorKind::BadInput, "no text to synthesize"));
        }

        let mut req = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(text, params));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = check_status(req.send().await?).await?;
        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::server("provider returned empty audio"));
        }
        log::debug!("tts: {} bytes of {} audio", audio.len(), self.format);
        Ok(audio.to_vec())
    }
}
