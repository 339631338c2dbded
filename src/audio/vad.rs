use super::{frame_rms, percentile, AudioTrack};

/// Per-frame speech activity over an audio track
pub trait VoiceActivityDetector: Send + Sync {
    fn voice_activity(&self, track: &AudioTrack) -> Vec<bool>;
}

/// Coarse speech/no-speech estimate from frame energy.
///
/// 25 ms windows with a 10 ms hop at 16 kHz. A frame is active when its RMS
/// exceeds `max(floor, p65 * relative)`.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    pub frame_length: usize,
    pub hop_length: usize,
    pub floor: f32,
    pub relative: f32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self {
            frame_length: 400,
            hop_length: 160,
            floor: 0.008,
            relative: 0.6,
        }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn voice_activity(&self, track: &AudioTrack) -> Vec<bool> {
        let rms = frame_rms(&track.samples, self.frame_length, self.hop_length);
        if rms.is_empty() {
            return Vec::new();
        }
        let threshold = self.floor.max(percentile(&rms, 65.0) * self.relative);
        rms.into_iter().map(|r| r > threshold).collect()
    }
}

/// Fraction of active frames, 0.0 for an empty signal
pub fn activity_ratio(activity: &[bool]) -> f64 {
    if activity.is_empty() {
        return 0.0;
    }
    activity.iter().filter(|&&a| a).count() as f64 / activity.len() as f64
}
