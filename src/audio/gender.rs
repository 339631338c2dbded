use serde::{Deserialize, Serialize};

use super::{frame_rms, percentile, AudioTrack};
use crate::config::Gender;

/// Estimated gender of the dominant source speaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenderEstimate {
    /// `None` when the estimate is inconclusive
    pub gender: Option<Gender>,
    pub confidence: f64,
    pub median_f0_hz: f64,
    pub voiced_ratio: f64,
    pub reason: String,
}

impl GenderEstimate {
    pub fn unknown<S: Into<String>>(reason: S, voiced_ratio: f64) -> Self {
        Self {
            gender: None,
            confidence: 0.0,
            median_f0_hz: 0.0,
            voiced_ratio,
            reason: reason.into(),
        }
    }
}

pub trait GenderEstimator: Send + Sync {
    fn estimate(&self, track: &AudioTrack) -> GenderEstimate;
}

/// Median-F0 estimate over energetic frames using normalized autocorrelation
#[derive(Debug, Clone)]
pub struct PitchGenderEstimator {
    pub frame_length: usize,
    pub hop_length: usize,
    pub fmin_hz: f64,
    pub fmax_hz: f64,
    /// At or below this median F0 the speaker is treated as male
    pub male_max_hz: f64,
    /// At or above this median F0 the speaker is treated as female
    pub female_min_hz: f64,
    /// Only the leading part of long recordings is analyzed
    pub max_analysis_secs: f64,
}

impl Default for PitchGenderEstimator {
    fn default() -> Self {
        Self {
            frame_length: 1024,
            hop_length: 256,
            fmin_hz: 70.0,
            fmax_hz: 350.0,
            male_max_hz: 160.0,
            female_min_hz: 185.0,
            max_analysis_secs: 120.0,
        }
    }
}

impl PitchGenderEstimator {
    /// Pitch of one frame, `None` when the frame is not periodic enough
    fn frame_pitch(&self, frame: &[f32], sample_rate: u32) -> Option<f64> {
        let min_lag = (sample_rate as f64 / self.fmax_hz).floor().max(1.0) as usize;
        let max_lag = (sample_rate as f64 / self.fmin_hz).ceil() as usize;
        if frame.len() <= max_lag + 1 {
            return None;
        }

        let mut scores = Vec::with_capacity(max_lag - min_lag + 1);
        for lag in min_lag..=max_lag {
            let head = &frame[..frame.len() - lag];
            let tail = &frame[lag..];
            let mut cross = 0.0f64;
            let mut e1 = 0.0f64;
            let mut e2 = 0.0f64;
            for (a, b) in head.iter().zip(tail) {
                cross += (*a as f64) * (*b as f64);
                e1 += (*a as f64) * (*a as f64);
                e2 += (*b as f64) * (*b as f64);
            }
            let denom = (e1 * e2).sqrt();
            scores.push(if denom > 0.0 { cross / denom } else { 0.0 });
        }

        let best = scores.iter().cloned().fold(f64::MIN, f64::max);
        if best < 0.5 {
            return None;
        }
        // First peak close to the global best avoids octave-down errors.
        let mut offset = scores.iter().position(|&s| s >= best * 0.9)?;
        while offset + 1 < scores.len() && scores[offset + 1] > scores[offset] {
            offset += 1;
        }
        Some(sample_rate as f64 / (min_lag + offset) as f64)
    }
}

impl GenderEstimator for PitchGenderEstimator {
    fn estimate(&self, track: &AudioTrack) -> GenderEstimate {
        let sr = track.sample_rate as usize;
        if sr == 0 || track.samples.len() < sr {
            return GenderEstimate::unknown("Audio too short for reliable gender detection.", 0.0);
        }

        let limit = ((self.max_analysis_secs * sr as f64) as usize).min(track.samples.len());
        let samples = &track.samples[..limit];

        let rms = frame_rms(samples, self.frame_length, self.hop_length);
        let energy_threshold = percentile(&rms, 30.0).max(0.0035);
        let voiced: Vec<bool> = rms.iter().map(|&r| r > energy_threshold).collect();
        let voiced_ratio = if voiced.is_empty() {
            0.0
        } else {
            voiced.iter().filter(|&&v| v).count() as f64 / voiced.len() as f64
        };
        if voiced_ratio < 0.08 {
            return GenderEstimate::unknown("Not enough voiced frames for pitch analysis.", voiced_ratio);
        }

        let mut pitches: Vec<f64> = voiced
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .filter_map(|(i, _)| {
                let start = i * self.hop_length;
                let end = (start + self.frame_length).min(samples.len());
                self.frame_pitch(&samples[start..end], track.sample_rate)
            })
            .collect();
        if pitches.len() < 30 {
            return GenderEstimate::unknown("Too few reliable pitch samples.", voiced_ratio);
        }

        pitches.sort_by(|a, b| a.total_cmp(b));
        let median_f0 = pitches[pitches.len() / 2];

        let (gender, confidence, reason) = if median_f0 <= self.male_max_hz {
            (
                Some(Gender::Male),
                (0.55 + (self.male_max_hz - median_f0) / 60.0).min(0.95),
                format!("Median pitch {:.1} Hz suggests male voice.", median_f0),
            )
        } else if median_f0 >= self.female_min_hz {
            (
                Some(Gender::Female),
                (0.55 + (median_f0 - self.female_min_hz) / 60.0).min(0.95),
                format!("Median pitch {:.1} Hz suggests female voice.", median_f0),
            )
        } else {
            (None, 0.35, format!("Median pitch {:.1} Hz is ambiguous.", median_f0))
        };

        GenderEstimate {
            gender,
            confidence,
            median_f0_hz: median_f0,
            voiced_ratio,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{modulated_sine, silence, sine};
    use crate::audio::PIPELINE_SAMPLE_RATE;

    #[test]
    fn test_low_pitch_is_male() {
        let estimate = PitchGenderEstimator::default().estimate(&modulated_sine(115.0, 2.0, PIPELINE_SAMPLE_RATE));
        assert_eq!(estimate.gender, Some(Gender::Male));
        assert!((estimate.median_f0_hz - 115.0).abs() < 5.0, "f0 {}", estimate.median_f0_hz);
    }

    #[test]
    fn test_high_pitch_is_female() {
        let estimate = PitchGenderEstimator::default().estimate(&modulated_sine(230.0, 2.0, PIPELINE_SAMPLE_RATE));
        assert_eq!(estimate.gender, Some(Gender::Female));
        assert!(estimate.confidence > 0.55);
    }

    #[test]
    fn test_short_or_silent_audio_is_unknown() {
        let estimator = PitchGenderEstimator::default();
        assert_eq!(estimator.estimate(&sine(115.0, 0.5, 0.4, PIPELINE_SAMPLE_RATE)).gender, None);
        assert_eq!(estimator.estimate(&silence(3.0, PIPELINE_SAMPLE_RATE)).gender, None);
    }
}
