//! Fixed-window microphone capture via `cpal`.
//!
//! [`AudioSource::record`] opens the configured input device, collects
//! exactly `duration` worth of audio and closes the device again.  The
//! result is always 16 kHz mono so every consumer (Whisper, the remote
//! STT API, the level analysis) sees the same format.
//!
//! Recording blocks the calling thread; async callers go through
//! `tokio::task::spawn_blocking`.

use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};

use super::resample::{downmix, resample};
use super::{find_device, DeviceError, Direction};

/// Sample rate of every [`PcmBuffer`] produced by capture.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Extra time granted to the device beyond the requested window before the
/// capture is declared stuck.
const STALL_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One callback's worth of interleaved samples, as cpal delivered it.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// PcmBuffer
// ---------------------------------------------------------------------------

/// Mono `f32` samples in `[-1.0, 1.0]` at a known rate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Silent buffer of the given length at [`TARGET_SAMPLE_RATE`].
    pub fn silence(duration: Duration) -> Self {
        let n = (duration.as_secs_f64() * f64::from(TARGET_SAMPLE_RATE)) as usize;
        Self::new(vec![0.0; n], TARGET_SAMPLE_RATE)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Same audio at `rate` Hz.
    pub fn resampled(&self, rate: u32) -> PcmBuffer {
        PcmBuffer::new(resample(&self.samples, self.sample_rate, rate), rate)
    }
}

// ---------------------------------------------------------------------------
// AudioSource
// ---------------------------------------------------------------------------

/// Anything that can record a fixed window of audio.
///
/// Implementations block for roughly `duration`.
pub trait AudioSource: Send + Sync {
    fn record(&self, device: &str, duration: Duration) -> Result<PcmBuffer, DeviceError>;
}

/// Run [`AudioSource::record`] on the blocking pool.
pub async fn record_blocking(
    source: Arc<dyn AudioSource>,
    device: &str,
    duration: Duration,
) -> Result<PcmBuffer, DeviceError> {
    let device = device.to_string();
    tokio::task::spawn_blocking(move || source.record(&device, duration))
        .await
        .map_err(|e| DeviceError::Config(format!("capture task failed: {e}")))?
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

/// [`AudioSource`] backed by the default cpal host.
///
/// The device is opened per call so a device change in settings (or a USB
/// microphone being re-plugged) takes effect on the next window.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSource;

impl CpalSource {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSource for CpalSource {
    fn record(&self, device_name: &str, duration: Duration) -> Result<PcmBuffer, DeviceError> {
        let device = find_device(device_name, Direction::Input)?;
        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let wanted_frames = (duration.as_secs_f64() * f64::from(sample_rate)) as usize;
        let wanted_samples = wanted_frames * usize::from(channels);

        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Receiver gone means the window is complete.
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("audio: input stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        log::debug!(
            "audio: recording {:.1}s from `{}` ({} Hz, {} ch)",
            duration.as_secs_f32(),
            device.name().unwrap_or_default(),
            sample_rate,
            channels
        );

        let deadline = Instant::now() + duration + STALL_GRACE;
        let mut interleaved = Vec::with_capacity(wanted_samples);
        while interleaved.len() < wanted_samples {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(chunk) => interleaved.extend_from_slice(&chunk.samples),
                Err(_) => return Err(DeviceError::Timeout),
            }
        }
        drop(stream);
        interleaved.truncate(wanted_samples);

        let mono = downmix(&interleaved, channels);
        Ok(PcmBuffer::new(mono, sample_rate).resampled(TARGET_SAMPLE_RATE))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
