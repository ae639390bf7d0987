//! Keyword spotting through an external process.
//!
//! The command template from `keyword_spotter_command` is split on
//! whitespace and `{access_key}`, `{phrase}` and `{device}` are substituted
//! per argument, so values containing spaces stay one argument.  Any stdout
//! line containing "detected" (case-insensitive) counts as a wake.  The
//! child is killed when the listen ends, including on cancellation.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::wake::{WakeDetector, WakeError, WakeEvent};

pub struct KeywordSpotter {
    template: String,
    access_key: String,
    device: String,
}

impl KeywordSpotter {
    pub fn new(template: &str, access_key: &str, device: &str) -> Self {
        Self {
            template: template.to_string(),
            access_key: access_key.to_string(),
            device: device.to_string(),
        }
    }

    /// Program and arguments with placeholders filled in.
    pub fn command_line(&self, phrase: &str) -> Vec<String> {
        self.template
            .split_whitespace()
            .map(|arg| {
                arg.replace("{access_key}", &self.access_key)
                    .replace("{phrase}", phrase)
                    .replace("{device}", &self.device)
            })
            .collect()
    }
}

fn is_detection(line: &str) -> bool {
    line.to_lowercase().contains("detected")
}

#[async_trait]
impl WakeDetector for KeywordSpotter {
    async fn listen(&self, phrase: &str, cancel: &CancellationToken) -> Result<WakeEvent, WakeError> {
        let argv = self.command_line(phrase);
        let Some((program, args)) = argv.split_first() else {
            return Err(WakeError::Spawn("keyword_spotter_command is empty".into()));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WakeError::Spawn(format!("failed to start `{program}`: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WakeError::Spawn("spotter stdout unavailable".into()))?;
        let mut lines = BufReader::new(stdout).lines();
        log::debug!("wake: keyword spotter `{program}` started for `{phrase}`");

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WakeError::Cancelled),
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if is_detection(&line) => {
                    log::info!("wake: keyword spotter fired: {}", line.trim());
                    return Ok(WakeEvent::now(None));
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    let status = child.wait().await.ok();
                    return Err(WakeError::Spawn(format!(
                        "`{program}` exited ({})",
                        status.map_or_else(|| "unknown status".to_string(), |s| s.to_string())
                    )));
                }
                Err(e) => return Err(WakeError::Spawn(format!("reading spotter output: {e}"))),
            }
        }
    }

    fn name(&self) -> &'static str {
        "keyword-spotter"
    }
}
