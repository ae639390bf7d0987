//! Speaker output and TTS audio decoding.
//!
//! [`play`] blocks until the buffer has been played (plus a short tail so
//! the last syllable is not clipped).  Decoders turn MP3 (networked TTS) and
//! WAV (espeak) bytes into a mono [`PcmBuffer`].

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};

use super::capture::PcmBuffer;
use super::resample::downmix;
use super::{find_device, DeviceError, Direction};

const TAIL: Duration = Duration::from_millis(150);

// ---------------------------------------------------------------------------
// play
// ---------------------------------------------------------------------------

/// Play `buf` on the named output device and wait for it to finish.
pub fn play(buf: &PcmBuffer, device_name: &str) -> Result<(), DeviceError> {
    if buf.is_empty() {
        return Ok(());
    }

    let device = find_device(device_name, Direction::Output)?;
    let supported = device.default_output_config()?;
    let channels = usize::from(supported.channels());
    let rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let samples = Arc::new(buf.resampled(rate).samples);
    let total = samples.len();
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    frame.iter_mut().for_each(|out| *out = sample);
                    if pos < samples.len() {
                        pos += 1;
                    }
                }
                position.store(pos, Ordering::Relaxed);
                if pos >= samples.len() {
                    finished.store(true, Ordering::Relaxed);
                }
            },
            |err: cpal::StreamError| {
                log::error!("audio: output stream error: {err}");
            },
            None,
        )?
    };
    stream.play()?;

    let expected = Duration::from_secs_f64(total as f64 / f64::from(rate));
    let deadline = Instant::now() + expected + Duration::from_secs(2);
    while !finished.load(Ordering::Relaxed) {
        if Instant::now() > deadline {
            log::warn!("audio: playback did not finish in time, stopping");
            return Err(DeviceError::Timeout);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(TAIL);
    drop(stream);

    log::debug!("audio: played {:.1}s", expected.as_secs_f32());
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Decode MP3 bytes to mono.  Frames of differing channel count are mixed
/// individually; the rate of the first frame is used.
pub fn decode_mp3(bytes: &[u8]) -> Result<PcmBuffer, DeviceError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if rate == 0 {
                    rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                let channels = u16::try_from(frame.channels).unwrap_or(1);
                samples.extend(downmix(&pcm, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(DeviceError::Decode(format!("mp3: {e}"))),
        }
    }

    if samples.is_empty() || rate == 0 {
        return Err(DeviceError::Decode("mp3: no audio frames".into()));
    }
    Ok(PcmBuffer::new(samples, rate))
}

/// Decode a WAV file (16-bit int or 32-bit float) to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<PcmBuffer, DeviceError> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| DeviceError::Decode(format!("wav: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| DeviceError::Decode(format!("wav: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| DeviceError::Decode(format!("wav: {e}")))?
        }
    };

    Ok(PcmBuffer::new(downmix(&interleaved, spec.channels), spec.sample_rate))
}

/// Encode mono PCM as a 16-bit WAV file (for upload to STT APIs).
pub fn pcm_to_wav(buf: &PcmBuffer) -> Result<Vec<u8>, DeviceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buf.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| DeviceError::Decode(format!("wav: {e}")))?;
        for &s in &buf.samples {
            let v = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(v)
                .map_err(|e| DeviceError::Decode(format!("wav: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| DeviceError::Decode(format!("wav: {e}")))?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
