//! Remote transcription via the OpenAI audio API.
//!
//! The buffer is encoded as a 16-bit WAV and uploaded as multipart form
//! data to `/v1/audio/transcriptions` with model `whisper-1`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::audio::{pcm_to_wav, PcmBuffer};
use crate::provider::ProviderError;
use crate::stt::engine::Transcriber;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MODEL: &str = "whisper-1";

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Cloud Whisper transcriber.
#[derive(Debug, Clone)]
pub struct ApiWhisper {
    client: reqwest::Client,
    api_key: String,
    language: String,
    base_url: String,
}

impl ApiWhisper {
    /// `language` is passed through unless it is `"auto"`.
    pub fn new(client: reqwest::Client, api_key: &str, language: &str) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::Auth(
                "openai_api_key is required for whisper_mode = api".into(),
            ));
        }
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            language: language.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a compatible server instead of api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Transcriber for ApiWhisper {
    async fn transcribe(&self, audio: &PcmBuffer) -> Result<String, ProviderError> {
        let wav = pcm_to_wav(audio).map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
        log::debug!("stt: uploading {} bytes to {}", wav.len(), self.base_url);

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", MODEL);
        if self.language != "auto" {
            form = form.text("language", self.language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "whisper-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_an_auth_error() {
        let err = ApiWhisper::new(reqwest::Client::new(), "", "en").unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test]
    fn base_url_is_normalised() {
        let t = ApiWhisper::new(reqwest::Client::new(), "sk-test", "en")
            .unwrap()
            .with_base_url("http://localhost:9000/v1/");
        assert_eq!(t.base_url, "http://localhost:9000/v1");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let t = ApiWhisper::new(reqwest::Client::new(), "sk-test", "en")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = t
            .transcribe(&PcmBuffer::new(vec![0.0; 16_000], 16_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)), "got {err:?}");
    }
}
