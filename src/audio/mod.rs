//! Audio I/O: fixed-window microphone capture, level analysis and playback.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix → resample(16 kHz)
//!           → PcmBuffer ─┬─► MuteTracker (level)
//!                        └─► Transcriber / wake detector
//!
//! TTS bytes → decode_mp3 / decode_wav → PcmBuffer → play() → speaker
//! ```

pub mod capture;
pub mod level;
pub mod playback;
pub mod resample;

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use thiserror::Error;

pub use capture::{record_blocking, AudioChunk, AudioSource, CpalSource, PcmBuffer, TARGET_SAMPLE_RATE};
pub use level::{is_digital_silence, rms, MuteTracker};
pub use playback::{decode_mp3, decode_wav, play, pcm_to_wav};
pub use resample::{downmix, resample, resample_to_16k};

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors opening or driving an audio device.  A device error aborts the
/// current cycle; it is never fatal to the process.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no {0} device available on the default audio host")]
    NoDevice(&'static str),

    #[error("audio device `{0}` not found")]
    DeviceNotFound(String),

    #[error("failed to query device config: {0}")]
    Config(String),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio device stopped delivering samples")]
    Timeout,

    #[error("audio decode error: {0}")]
    Decode(String),
}

impl From<cpal::DefaultStreamConfigError> for DeviceError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        DeviceError::Config(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Device lookup
// ---------------------------------------------------------------------------

/// Input and output device names as reported by the default host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioDevices {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Enumerate devices.  `"default"` is always listed first.
pub fn list_devices() -> AudioDevices {
    let host = cpal::default_host();

    let mut inputs = vec!["default".to_string()];
    match host.input_devices() {
        Ok(devices) => inputs.extend(devices.filter_map(|d| d.name().ok())),
        Err(e) => log::warn!("audio: cannot enumerate input devices: {e}"),
    }

    let mut outputs = vec!["default".to_string()];
    match host.output_devices() {
        Ok(devices) => outputs.extend(devices.filter_map(|d| d.name().ok())),
        Err(e) => log::warn!("audio: cannot enumerate output devices: {e}"),
    }

    AudioDevices { inputs, outputs }
}

#[derive(Clone, Copy)]
pub(crate) enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Resolve a configured device identifier.
///
/// `"default"` (or empty) selects the host default.  Anything else matches
/// the first device whose name contains the identifier, case-insensitively.
pub(crate) fn find_device(name: &str, direction: Direction) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    let wanted = name.trim();

    if wanted.is_empty() || wanted.eq_ignore_ascii_case("default") {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or(DeviceError::NoDevice(direction.label()));
    }

    let wanted_lower = wanted.to_lowercase();
    let devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(|e| DeviceError::Config(e.to_string()))?;

    for device in devices {
        if device
            .name()
            .is_ok_and(|n| n.to_lowercase().contains(&wanted_lower))
        {
            return Ok(device);
        }
    }
    Err(DeviceError::DeviceNotFound(wanted.to_string()))
}
