// Audio analysis helpers
//
// Everything here works on mono PCM decoded from WAV files:
// - mod: decode/encode, level statistics, silence checks
// - vad: energy-based voice activity
// - gender: pitch statistics used to pick a voice gender

pub mod gender;
pub mod vad;

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

pub use gender::*;
pub use vad::*;

use crate::error::{DubError, Result};

/// Sample rate used for every intermediate WAV file
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;

/// Mono PCM samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn levels(&self) -> AudioLevels {
        AudioLevels::measure(&self.samples)
    }
}

/// Amplitude statistics of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioLevels {
    pub peak: f32,
    pub rms: f32,
}

impl AudioLevels {
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }
        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f64;
        for &s in samples {
            peak = peak.max(s.abs());
            sum_sq += (s as f64) * (s as f64);
        }
        let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
        Self { peak, rms }
    }

    /// Near-silent when either the peak or the RMS is under its floor
    pub fn is_near_silent(&self, peak_floor: f32, rms_floor: f32) -> bool {
        self.peak < peak_floor || self.rms < rms_floor
    }
}

/// Decode a WAV file, downmixing to mono
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioTrack> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| DubError::Media(format!("WAV read error for {}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, hound::Error>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(AudioTrack::new(samples, spec.sample_rate))
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Encode as 16-bit mono PCM WAV
pub fn write_wav<P: AsRef<Path>>(path: P, track: &AudioTrack) -> Result<()> {
    let mut writer = hound::WavWriter::create(path.as_ref(), wav_spec(track.sample_rate))?;
    for &s in &track.samples {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encode as an in-memory WAV payload
pub fn encode_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// RMS of each analysis frame
pub fn frame_rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    if samples.is_empty() || frame_length == 0 || hop_length == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(samples.len() / hop_length + 1);
    let mut start = 0;
    while start < samples.len() {
        let end = (start + frame_length).min(samples.len());
        out.push(AudioLevels::measure(&samples[start..end]).rms);
        if end == samples.len() {
            break;
        }
        start += hop_length;
    }
    out
}

/// Linear-interpolated percentile, `p` in [0, 100]
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
