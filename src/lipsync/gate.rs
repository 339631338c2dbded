use serde::Serialize;

use super::face::{FaceBox, FaceObservation};
use crate::audio::activity_ratio;
use crate::config::GateConfig;

/// Whether lip-sync should be attempted, and the measurements behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub eligible: bool,
    /// Fraction of sampled frames whose main face overlaps the dominant face
    pub face_ratio: f64,
    /// Fraction of audio frames with speech energy
    pub speech_ratio: f64,
    /// Set whenever at least one face was seen
    pub dominant_box: Option<FaceBox>,
    pub reason: String,
}

impl GateDecision {
    /// Used when the signals could not be measured
    pub fn ineligible<S: Into<String>>(reason: S) -> Self {
        Self {
            eligible: false,
            face_ratio: 0.0,
            speech_ratio: 0.0,
            dominant_box: None,
            reason: reason.into(),
        }
    }
}

fn median(mut values: Vec<i32>) -> i32 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        ((values[mid - 1] as i64 + values[mid] as i64) / 2) as i32
    } else {
        values[mid]
    }
}

/// Component-wise median of the given boxes
pub fn dominant_box(boxes: &[FaceBox]) -> Option<FaceBox> {
    if boxes.is_empty() {
        return None;
    }
    Some(FaceBox::new(
        median(boxes.iter().map(|b| b.y1).collect()),
        median(boxes.iter().map(|b| b.y2).collect()),
        median(boxes.iter().map(|b| b.x1).collect()),
        median(boxes.iter().map(|b| b.x2).collect()),
    ))
}

/// Decide lip-sync eligibility from per-frame faces and per-frame speech
/// activity. Deterministic in its inputs.
pub fn evaluate(faces: &[FaceObservation], activity: &[bool], config: &GateConfig) -> GateDecision {
    let speech_ratio = activity_ratio(activity);
    if faces.is_empty() {
        return GateDecision {
            speech_ratio,
            ..GateDecision::ineligible("No video frames were sampled for face analysis.")
        };
    }

    let primaries: Vec<Option<FaceBox>> = faces.iter().map(|o| o.primary().copied()).collect();
    let present: Vec<FaceBox> = primaries.iter().flatten().copied().collect();
    let dominant = dominant_box(&present);

    let stable = match dominant {
        Some(d) => primaries
            .iter()
            .flatten()
            .filter(|b| b.iou(&d) >= config.stability_iou)
            .count(),
        None => 0,
    };
    let face_ratio = stable as f64 / faces.len() as f64;
    let min_size = config.min_face_size_px as i32;

    let (eligible, reason) = if face_ratio < config.min_face_ratio {
        (
            false,
            format!(
                "Face not continuously visible enough for lip-sync safety (face_ratio={:.2}).",
                face_ratio
            ),
        )
    } else if speech_ratio < config.min_speech_ratio {
        (false, format!("Speech activity too low (speech_ratio={:.2}).", speech_ratio))
    } else if dominant.map_or(true, |d| d.width() < min_size || d.height() < min_size) {
        (false, "Dominant face region is too small for lip-sync.".to_string())
    } else {
        (true, "Face and speech checks passed.".to_string())
    };

    GateDecision {
        eligible,
        face_ratio,
        speech_ratio,
        dominant_box: dominant,
        reason,
    }
}
