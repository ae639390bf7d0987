//! Offline TTS through the `espeak` command line synthesiser.
//!
//! `espeak -s <wpm> -v <lang> --stdout <text>` writes a WAV file to stdout,
//! which is decoded and played on the configured output device.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::audio::decode_wav;
use crate::provider::ProviderError;
use crate::tts::{play_blocking, spawn_failure, Speaker};

const PROGRAM: &str = "espeak";

pub struct EspeakSpeaker {
    language: String,
    speed: u32,
    device: String,
}

impl EspeakSpeaker {
    pub fn new(language: &str, speed: u32, device: &str) -> Self {
        Self {
            language: language.to_string(),
            speed,
            device: device.to_string(),
        }
    }

    fn args(&self, text: &str) -> Vec<String> {
        vec![
            "-s".into(),
            self.speed.to_string(),
            "-v".into(),
            self.language.clone(),
            "--stdout".into(),
            text.to_string(),
        ]
    }
}

#[async_trait]
impl Speaker for EspeakSpeaker {
    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let output = Command::new(PROGRAM)
            .args(self.args(text))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_failure(PROGRAM, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::InvalidInput(format!(
                "{PROGRAM} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let pcm = decode_wav(&output.stdout).map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
        play_blocking(pcm, self.device.clone()).await
    }

    fn name(&self) -> &'static str {
        "espeak"
    }
}
