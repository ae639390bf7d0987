//! Signal level helpers and hardware-mute detection.
//!
//! A muted microphone (hardware switch, muted USB speakerphone) still
//! delivers buffers, but every sample is at or near zero.  [`MuteTracker`]
//! watches successive capture windows and flips a shared flag with
//! hysteresis so one quiet room does not count as muted and one click does
//! not count as unmuted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::capture::PcmBuffer;

/// Peak amplitude at or below which a window counts as digital silence.
pub const SILENCE_PEAK: f32 = 1.0e-4;

/// Consecutive windows needed to change state.
pub const MUTE_HYSTERESIS: u32 = 3;

/// Root-mean-square level of `samples`.  Empty input is 0.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs()))
}

/// `true` when every sample is within [`SILENCE_PEAK`] of zero.
pub fn is_digital_silence(buf: &PcmBuffer) -> bool {
    peak(&buf.samples) <= SILENCE_PEAK
}

// ---------------------------------------------------------------------------
// MuteTracker
// ---------------------------------------------------------------------------

/// Hysteresis counter over capture windows.
///
/// The muted flag is an `Arc<AtomicBool>` so the monitoring surface and the
/// wake detector can read it without touching the tracker.
#[derive(Debug)]
pub struct MuteTracker {
    muted: Arc<AtomicBool>,
    silent_run: u32,
    active_run: u32,
}

impl MuteTracker {
    pub fn new(muted: Arc<AtomicBool>) -> Self {
        Self {
            muted,
            silent_run: 0,
            active_run: 0,
        }
    }

    /// Feed one capture window.  Returns the (possibly new) muted state.
    pub fn observe(&mut self, buf: &PcmBuffer) -> bool {
        if is_digital_silence(buf) {
            self.silent_run = self.silent_run.saturating_add(1);
            self.active_run = 0;
        } else {
            self.active_run = self.active_run.saturating_add(1);
            self.silent_run = 0;
        }

        let was_muted = self.is_muted();
        if !was_muted && self.silent_run >= MUTE_HYSTERESIS {
            self.muted.store(true, Ordering::Relaxed);
            log::info!("audio: microphone appears muted");
        } else if was_muted && self.active_run >= MUTE_HYSTERESIS {
            self.muted.store(false, Ordering::Relaxed);
            log::info!("audio: microphone unmuted");
        }
        self.is_muted()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.muted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
