//! Networked TTS via the Google Translate speech endpoint (`tts_provider = gtts`).
//!
//! The endpoint only accepts short inputs, so text is split on sentence and
//! word boundaries into pieces of at most [`MAX_CHUNK_CHARS`] characters.
//! Each piece comes back as MP3; the decoded pieces are concatenated and
//! played as one buffer.

use std::time::Duration;

use async_trait::async_trait;

use crate::audio::{decode_mp3, PcmBuffer};
use crate::provider::ProviderError;
use crate::tts::{play_blocking, Speaker};

const ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Longest piece of text sent in one request.
pub const MAX_CHUNK_CHARS: usize = 100;

pub struct NetworkSpeaker {
    client: reqwest::Client,
    language: String,
    device: String,
    endpoint: String,
    timeout: Duration,
}

impl NetworkSpeaker {
    /// `timeout` bounds each chunk request; a stalled endpoint fails with
    /// [`ProviderError::Network`].
    pub fn new(client: reqwest::Client, language: &str, device: &str, timeout: Duration) -> Self {
        Self {
            client,
            language: language.to_string(),
            device: device.to_string(),
            endpoint: ENDPOINT.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn chunk_url(&self, chunk: &str, index: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&client=tw-ob&tl={}&total={total}&idx={index}&textlen={}&q={}",
            self.endpoint,
            urlencoding::encode(&self.language),
            chunk.chars().count(),
            urlencoding::encode(chunk),
        )
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Speaker for NetworkSpeaker {
    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Ok(());
        }

        let mut speech = PcmBuffer::default();
        for (i, chunk) in chunks.iter().enumerate() {
            let mp3 = self.fetch(&self.chunk_url(chunk, i, chunks.len())).await?;
            let decoded = decode_mp3(&mp3).map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
            if speech.is_empty() {
                speech = decoded;
            } else {
                speech
                    .samples
                    .extend(decoded.resampled(speech.sample_rate).samples);
            }
        }

        log::debug!("tts: gtts speaking {} chunk(s)", chunks.len());
        play_blocking(speech, self.device.clone()).await
    }

    fn name(&self) -> &'static str {
        "gtts"
    }
}

/// Split `text` into pieces no longer than `max_chars`, preferring sentence
/// ends, then word boundaries.  Words longer than `max_chars` are cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            chunks.push(head);
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);

        if current.ends_with(['.', '!', '?']) {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}
