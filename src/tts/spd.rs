//! Offline TTS through speech-dispatcher (`spd-say`).
//!
//! speech-dispatcher plays on its own configured sink, so the output device
//! setting does not apply here.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::provider::ProviderError;
use crate::tts::{spawn_failure, Speaker};

const PROGRAM: &str = "spd-say";

/// Words per minute that `spd-say -r 0` roughly corresponds to.
const NEUTRAL_WPM: i64 = 160;

pub struct SpdSpeaker {
    language: String,
    speed: u32,
}

impl SpdSpeaker {
    pub fn new(language: &str, speed: u32) -> Self {
        Self {
            language: language.to_string(),
            speed,
        }
    }

    fn args(&self, text: &str) -> Vec<String> {
        vec![
            "-w".into(),
            "-r".into(),
            wpm_to_rate(self.speed).to_string(),
            "-l".into(),
            self.language.clone(),
            "--".into(),
            text.to_string(),
        ]
    }
}

/// Map words per minute onto speech-dispatcher's -100..=100 rate scale.
pub fn wpm_to_rate(wpm: u32) -> i64 {
    ((i64::from(wpm) - NEUTRAL_WPM) / 2).clamp(-100, 100)
}

#[async_trait]
impl Speaker for SpdSpeaker {
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
            return Err(ProviderError::Unavailable(format!(
                "{PROGRAM} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "spd"
    }
}
