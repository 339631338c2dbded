use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::LipSyncConfig;
use crate::error::{DubError, Result};
use crate::process::ExternalCommand;

/// Face rectangle in pixel rows (`y1..y2`) and columns (`x1..x2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub y1: i32,
    pub y2: i32,
    pub x1: i32,
    pub x2: i32,
}

impl FaceBox {
    pub fn new(y1: i32, y2: i32, x1: i32, x2: i32) -> Self {
        Self { y1, y2, x1, x2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Intersection over union, 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &FaceBox) -> f64 {
        let inter = FaceBox::new(
            self.y1.max(other.y1),
            self.y2.min(other.y2),
            self.x1.max(other.x1),
            self.x2.min(other.x2),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f64 / union as f64
    }
}

/// Faces detected on one sampled video frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub frame: u64,
    #[serde(default)]
    pub faces: Vec<FaceBox>,
}

impl FaceObservation {
    /// The largest face is taken as the likely speaker
    pub fn primary(&self) -> Option<&FaceBox> {
        self.faces.iter().max_by_key(|f| f.area())
    }
}

/// Per-frame face presence over a video
#[async_trait]
pub trait FaceTracker: Send + Sync {
    async fn face_track(&self, video: &Path, cancel: &CancellationToken) -> Result<Vec<FaceObservation>>;
}

/// Runs an external detector that prints one JSON observation per line
pub struct CommandFaceTracker {
    command: Vec<String>,
    sample_every: u32,
    timeout: Duration,
}

impl CommandFaceTracker {
    pub fn new(config: &LipSyncConfig) -> Self {
        Self {
            command: config.face_tracker_command.clone(),
            sample_every: config.face_sample_every.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Parse JSON-lines detector output, ignoring blank lines
pub fn parse_observations(stdout: &str) -> Result<Vec<FaceObservation>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<FaceObservation>(line)
                .map_err(|e| DubError::Media(format!("Bad face tracker line '{}': {}", line, e)))
        })
        .collect()
}

#[async_trait]
impl FaceTracker for CommandFaceTracker {
    async fn face_track(&self, video: &Path, cancel: &CancellationToken) -> Result<Vec<FaceObservation>> {
        let (program, rest) = self
            .command
            .split_first()
            .ok_or_else(|| DubError::Config("lipsync.face_tracker_command must not be empty".to_string()))?;

        let output = ExternalCommand::new(program, "Face tracking")
            .args(rest.iter().cloned())
            .arg("--video")
            .path_arg(video)
            .arg("--every")
            .arg(self.sample_every.to_string())
            .timeout(self.timeout)
            .execute_with(cancel, DubError::Media)
            .await?;

        let observations = parse_observations(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Face tracker sampled {} frames of {}", observations.len(), video.display());
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = FaceBox::new(0, 10, 0, 10);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&FaceBox::new(20, 30, 20, 30)), 0.0);
        // half overlap: 50 / 150
        assert!((a.iou(&FaceBox::new(0, 10, 5, 15)) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_primary_is_largest_face() {
        let obs = FaceObservation {
            frame: 4,
            faces: vec![FaceBox::new(0, 10, 0, 10), FaceBox::new(0, 50, 0, 50)],
        };
        assert_eq!(obs.primary(), Some(&FaceBox::new(0, 50, 0, 50)));
    }

    #[test]
    fn test_parse_observations() {
        let stdout = "{\"frame\":0,\"faces\":[{\"y1\":1,\"y2\":2,\"x1\":3,\"x2\":4}]}\n\n{\"frame\":2}\n";
        let observations = parse_observations(stdout).unwrap();
        assert_eq!(observations.len(), 2);
        assert!(observations[1].faces.is_empty());
        assert!(parse_observations("garbage").is_err());
    }
}
