//! `ApiTranscriber` — multipart upload to an OpenAI-compatible
//! `/v1/audio/transcriptions` endpoint (Groq, OpenAI, local whisper servers).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{AudioClip, TranscribeOptions, Transcriber};
use crate::config::SttConfig;
use crate::provider::{check_status, http_client, ProviderError, ProviderErrorKind};

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

pub struct ApiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ApiTranscriber {
    pub fn from_config(config: &SttConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl Transcriber for ApiTranscriber {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        options: &TranscribeOptions,
    ) -> Result<String, ProviderError> {
        if clip.data.is_empty() {
            return Err(ProviderError::new(
                ProviderErrorKind::BadInput,
                "audio clip is empty",
            ));
        }

        let file = Part::bytes(clip.data.clone())
            .file_name(format!("audio.{}", clip.file_extension()))
            .mime_str(&clip.mime_type)
            .map_err(|e| ProviderError::new(ProviderErrorKind::BadInput, e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", options.language.clone())
            .text("response_format", "json");

        let mut req = self.client.post(self.endpoint()).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = check_status(req.send().await?).await?;
        let body: TranscriptionResponse = response.json().await?;
        log::debug!("stt: {} chars from {:.1}s of audio", body.text.len(), clip.duration_secs);
        Ok(body.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uses_base_url() {
        let api = ApiTranscriber::from_config(&SttConfig::default()).expect("client");
        assert_eq!(
            api.endpoint(),
            "https://api.groq.com/openai/v1/audio/transcriptions"
        );
    }

    #[tokio::test]
    async fn empty_clip_is_bad_input() {
        let api = ApiTranscriber::from_config(&SttConfig::default()).expect("client");
        let clip = AudioClip {
            data: Vec::new(),
            mime_type: "audio/wav".into(),
            sample_rate: 16_000,
            duration_secs: 0.0,
        };
        let err = api
            .transcribe(&clip, &TranscribeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::BadInput);
    }

    #[test]
    fn response_without_text_is_empty() {
        let parsed: TranscriptionResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.text.is_empty());
    }
}
