use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::face::FaceBox;
use crate::config::{DevicePolicy, LipSyncConfig};
use crate::error::{DubError, Result};
use crate::process::ExternalCommand;

/// One rung of the lip-sync parameter ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LipSyncAttemptConfig {
    pub label: String,
    pub extra_args: Vec<String>,
}

impl LipSyncAttemptConfig {
    fn new(label: &str, extra_args: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            extra_args: extra_args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Model batch size and face detector batch size for a device
pub fn batch_sizes(device: DevicePolicy) -> (u32, u32) {
    match device {
        DevicePolicy::Cpu => (32, 4),
        DevicePolicy::Auto | DevicePolicy::Cuda => (64, 8),
    }
}

pub fn device_name(device: DevicePolicy) -> &'static str {
    match device {
        DevicePolicy::Auto => "auto",
        DevicePolicy::Cpu => "cpu",
        DevicePolicy::Cuda => "cuda",
    }
}

/// Configurations in the order they are tried. A known dominant face box
/// pins the crop first; the rest loosen padding and smoothing.
pub fn build_ladder(dominant_box: Option<&FaceBox>) -> Vec<LipSyncAttemptConfig> {
    let mut ladder = Vec::with_capacity(4);
    if let Some(b) = dominant_box {
        let mut extra = vec!["--box".to_string()];
        extra.extend([b.y1, b.y2, b.x1, b.x2].iter().map(|v| v.to_string()));
        extra.extend(["--resize_factor".to_string(), "1".to_string()]);
        ladder.push(LipSyncAttemptConfig {
            label: "dominant_box".to_string(),
            extra_args: extra,
        });
    }
    ladder.push(LipSyncAttemptConfig::new(
        "pads_20",
        &["--pads", "0", "20", "0", "0", "--resize_factor", "1"],
    ));
    ladder.push(LipSyncAttemptConfig::new(
        "pads_40_nosmooth",
        &["--pads", "0", "40", "0", "0", "--resize_factor", "1", "--nosmooth"],
    ));
    ladder.push(LipSyncAttemptConfig::new(
        "pads_40_resize_2",
        &["--pads", "0", "40", "0", "0", "--resize_factor", "2", "--nosmooth"],
    ));
    ladder
}

#[derive(Debug, Clone)]
pub struct LipSyncRequest {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub config: LipSyncAttemptConfig,
    pub device: DevicePolicy,
}

/// Lip-sync inference
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LipSyncService: Send + Sync {
    /// Render `request.video` re-synced to `request.audio` at `request.output`.
    /// Any model failure is an [`DubError::Inference`].
    async fn run(&self, request: &LipSyncRequest, cancel: &CancellationToken) -> Result<()>;

    async fn health_check(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Runs Wav2Lip's `inference.py` from its checkout
pub struct Wav2LipService {
    python: String,
    repo_dir: PathBuf,
    checkpoint: PathBuf,
    timeout: Duration,
}

impl Wav2LipService {
    pub fn new(config: &LipSyncConfig) -> Self {
        Self {
            python: config.python.clone(),
            repo_dir: config.repo_dir.clone(),
            checkpoint: config.checkpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn build_command(&self, request: &LipSyncRequest) -> Result<ExternalCommand> {
        let checkpoint = std::path::absolute(&self.checkpoint)?;
        let (batch, face_batch) = batch_sizes(request.device);
        Ok(ExternalCommand::new(&self.python, format!("Wav2Lip ({})", request.config.label))
            .arg("inference.py")
            .arg("--checkpoint_path")
            .path_arg(checkpoint)
            .arg("--face")
            .path_arg(&request.video)
            .arg("--audio")
            .path_arg(&request.audio)
            .arg("--outfile")
            .path_arg(&request.output)
            .arg("--wav2lip_batch_size")
            .arg(batch.to_string())
            .arg("--face_det_batch_size")
            .arg(face_batch.to_string())
            .args(request.config.extra_args.iter().cloned())
            .current_dir(&self.repo_dir)
            .env("WAV2LIP_DEVICE", device_name(request.device))
            .timeout(self.timeout))
    }
}

async fn non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.len() > 0).unwrap_or(false)
}

#[async_trait]
impl LipSyncService for Wav2LipService {
    async fn run(&self, request: &LipSyncRequest, cancel: &CancellationToken) -> Result<()> {
        let command = self.build_command(request)?;
        // a timed-out or unstartable model run is a model failure, not a network one
        command
            .execute_with(cancel, DubError::Inference)
            .await
            .map_err(|e| match e {
                DubError::Transport(msg) => DubError::Inference(msg),
                other => other,
            })?;

        if !non_empty_file(&request.output).await {
            return Err(DubError::Inference(format!(
                "Wav2Lip produced no output at {}",
                request.output.display()
            )));
        }
        debug!("Wav2Lip output written to {}", request.output.display());
        Ok(())
    }

    async fn health_check(&self, _cancel: &CancellationToken) -> Result<()> {
        if !self.repo_dir.join("inference.py").is_file() {
            return Err(DubError::Config(format!(
                "Wav2Lip checkout not found at {}",
                self.repo_dir.display()
            )));
        }
        if !self.checkpoint.is_file() {
            return Err(DubError::Config(format!(
                "Wav2Lip checkpoint not found at {}",
                self.checkpoint.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_with_dominant_box() {
        let ladder = build_ladder(Some(&FaceBox::new(10, 200, 30, 180)));
        assert_eq!(ladder.len(), 4);
        assert_eq!(ladder[0].label, "dominant_box");
        assert_eq!(
            ladder[0].extra_args,
            vec!["--box", "10", "200", "30", "180", "--resize_factor", "1"]
        );
        assert!(ladder[3].extra_args.contains(&"--nosmooth".to_string()));
    }

    #[test]
    fn test_ladder_without_box_starts_with_padding() {
        let ladder = build_ladder(None);
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0].label, "pads_20");
    }

    #[test]
    fn test_batch_sizes_follow_device() {
        assert_eq!(batch_sizes(DevicePolicy::Cpu), (32, 4));
        assert_eq!(batch_sizes(DevicePolicy::Cuda), (64, 8));
        assert_eq!(batch_sizes(DevicePolicy::Auto), (64, 8));
    }

    #[test]
    fn test_command_runs_in_repo_dir() {
        let service = Wav2LipService::new(&LipSyncConfig::default());
        let request = LipSyncRequest {
            video: PathBuf::from("/jobs/a/in.mp4"),
            audio: PathBuf::from("/jobs/a/dub.wav"),
            output: PathBuf::from("/jobs/a/out.mp4"),
            config: build_ladder(None).remove(0),
            device: DevicePolicy::Cpu,
        };
        let cmd = service.build_command(&request).unwrap();

        assert_eq!(cmd.binary_path, "python");
        assert_eq!(cmd.args[0], "inference.py");
        assert!(cmd.args.windows(2).any(|w| w == ["--face", "/jobs/a/in.mp4"]));
        assert!(cmd.args.windows(2).any(|w| w == ["--wav2lip_batch_size", "32"]));
        assert!(cmd.args.ends_with(&["--resize_factor".to_string(), "1".to_string()]));
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("external/Wav2Lip")));
        assert_eq!(cmd.envs.get("WAV2LIP_DEVICE").map(String::as_str), Some("cpu"));
    }
}
