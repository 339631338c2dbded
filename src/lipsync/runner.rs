use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::gate::GateDecision;
use super::wav2lip::{build_ladder, LipSyncRequest, LipSyncService};
use crate::config::{DevicePolicy, LipSyncConfig};
use crate::error::Result;
use crate::media::MediaProcessorTrait;

/// Which path produced the final video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    LipSync,
    Dubbed,
}

impl OutputKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::LipSync => "lipsync",
            Self::Dubbed => "dubbed",
        }
    }

    /// `<stem>_pashto_lipsync.mp4` or `<stem>_pashto_dubbed.mp4`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}_pashto_{}.mp4", stem, self.suffix())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LipSyncAttempt {
    pub config: String,
    pub success: bool,
    pub output: Option<PathBuf>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LipSyncOutcome {
    pub kind: OutputKind,
    pub path: PathBuf,
    pub attempts: Vec<LipSyncAttempt>,
}

/// Tries lip-sync configurations in order and falls back to a plain mux
pub struct LipSyncRunner {
    service: Arc<dyn LipSyncService>,
    media: Arc<dyn MediaProcessorTrait>,
    enabled: bool,
    max_attempts: usize,
    device: DevicePolicy,
}

impl LipSyncRunner {
    pub fn new(
        service: Arc<dyn LipSyncService>,
        media: Arc<dyn MediaProcessorTrait>,
        config: &LipSyncConfig,
        device: DevicePolicy,
    ) -> Self {
        Self {
            service,
            media,
            enabled: config.enabled,
            max_attempts: config.max_attempts as usize,
            device,
        }
    }

    /// Produce exactly one video in `out_dir`. Lip-sync failures end in the
    /// dubbed fallback; only a failed fallback mux or cancellation is an error.
    pub async fn run(
        &self,
        decision: &GateDecision,
        video: &Path,
        audio: &Path,
        out_dir: &Path,
        stem: &str,
        cancel: &CancellationToken,
    ) -> Result<LipSyncOutcome> {
        let mut attempts = Vec::new();

        if !self.enabled {
            info!("Lip-sync disabled, exporting dubbed video");
        } else if !decision.eligible {
            info!("Lip-sync skipped: {}", decision.reason);
        } else {
            let output = out_dir.join(OutputKind::LipSync.file_name(stem));
            let ladder = build_ladder(decision.dominant_box.as_ref());
            for config in ladder.into_iter().take(self.max_attempts) {
                let label = config.label.clone();
                info!("Lip-sync attempt with config {}", label);
                let request = LipSyncRequest {
                    video: video.to_path_buf(),
                    audio: audio.to_path_buf(),
                    output: output.clone(),
                    config,
                    device: self.device,
                };

                match self.service.run(&request, cancel).await {
                    Ok(()) => {
                        attempts.push(LipSyncAttempt {
                            config: label,
                            success: true,
                            output: Some(output.clone()),
                            reason: None,
                        });
                        return Ok(LipSyncOutcome {
                            kind: OutputKind::LipSync,
                            path: output,
                            attempts,
                        });
                    }
                    Err(e) => {
                        remove_partial(&output).await;
                        if e.is_cancelled() {
                            return Err(e);
                        }
                        warn!("Lip-sync config {} failed: {}", label, e);
                        attempts.push(LipSyncAttempt {
                            config: label,
                            success: false,
                            output: None,
                            reason: Some(e.to_string()),
                        });
                    }
                }
            }
            warn!("All {} lip-sync attempts failed, falling back to dubbed export", attempts.len());
        }

        let path = out_dir.join(OutputKind::Dubbed.file_name(stem));
        self.media.mux(video, audio, &path, cancel).await?;
        Ok(LipSyncOutcome {
            kind: OutputKind::Dubbed,
            path,
            attempts,
        })
    }
}

async fn remove_partial(path: &Path) {
    if tokio::fs::metadata(path).await.is_ok() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DubError;
    use crate::lipsync::face::FaceBox;
    use crate::lipsync::wav2lip::MockLipSyncService;
    use crate::media::MockMediaProcessorTrait;

    fn eligible() -> GateDecision {
        GateDecision {
            eligible: true,
            face_ratio: 1.0,
            speech_ratio: 0.6,
            dominant_box: Some(FaceBox::new(10, 200, 10, 200)),
            reason: "Face and speech checks passed.".to_string(),
        }
    }

    fn muxing_media() -> MockMediaProcessorTrait {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_mux().times(1).returning(|_, _, out, _| {
            std::fs::write(out, b"muxed").unwrap();
            Ok(())
        });
        media
    }

    fn runner(service: MockLipSyncService, media: MockMediaProcessorTrait) -> LipSyncRunner {
        LipSyncRunner::new(
            Arc::new(service),
            Arc::new(media),
            &LipSyncConfig::default(),
            DevicePolicy::Cpu,
        )
    }

    #[tokio::test]
    async fn test_ineligible_goes_straight_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockLipSyncService::new();
        service.expect_run().times(0);

        let outcome = runner(service, muxing_media())
            .run(
                &GateDecision::ineligible("no face"),
                Path::new("/in.mp4"),
                Path::new("/dub.wav"),
                dir.path(),
                "talk",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.kind, OutputKind::Dubbed);
        assert!(outcome.path.ends_with("talk_pashto_dubbed.mp4"));
        assert!(outcome.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_second_config_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockLipSyncService::new();
        let mut calls = 0;
        service.expect_run().times(2).returning(move |request, _| {
            calls += 1;
            if calls == 1 {
                std::fs::write(&request.output, b"partial").unwrap();
                Err(DubError::Inference("CUDA out of memory".to_string()))
            } else {
                std::fs::write(&request.output, b"synced").unwrap();
                Ok(())
            }
        });
        let mut media = MockMediaProcessorTrait::new();
        media.expect_mux().times(0);

        let outcome = runner(service, media)
            .run(
                &eligible(),
                Path::new("/in.mp4"),
                Path::new("/dub.wav"),
                dir.path(),
                "talk",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.kind, OutputKind::LipSync);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].config, "dominant_box");
        assert!(!outcome.attempts[0].success);
        assert!(outcome.attempts[1].success);
        assert!(!dir.path().join("talk_pashto_dubbed.mp4").exists());
    }

    #[tokio::test]
    async fn test_exhaustion_falls_back_to_dubbed() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockLipSyncService::new();
        service.expect_run().times(4).returning(|request, _| {
            std::fs::write(&request.output, b"partial").unwrap();
            Err(DubError::Inference("face not detected".to_string()))
        });

        let outcome = runner(service, muxing_media())
            .run(
                &eligible(),
                Path::new("/in.mp4"),
                Path::new("/dub.wav"),
                dir.path(),
                "talk",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.kind, OutputKind::Dubbed);
        assert_eq!(outcome.attempts.len(), 4);
        assert!(outcome.attempts.iter().all(|a| !a.success));
        assert!(!dir.path().join("talk_pashto_lipsync.mp4").exists());
        assert!(dir.path().join("talk_pashto_dubbed.mp4").exists());
    }

    #[tokio::test]
    async fn test_fallback_mux_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockLipSyncService::new();
        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_mux()
            .returning(|_, _, _, _| Err(DubError::Media("ffmpeg exited 1".to_string())));

        let result = runner(service, media)
            .run(
                &GateDecision::ineligible("no face"),
                Path::new("/in.mp4"),
                Path::new("/dub.wav"),
                dir.path(),
                "talk",
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(DubError::Media(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockLipSyncService::new();
        service
            .expect_run()
            .times(1)
            .returning(|_, _| Err(DubError::Cancelled("Wav2Lip cancelled".to_string())));
        let mut media = MockMediaProcessorTrait::new();
        media.expect_mux().times(0);

        let result = runner(service, media)
            .run(
                &eligible(),
                Path::new("/in.mp4"),
                Path::new("/dub.wav"),
                dir.path(),
                "talk",
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(DubError::Cancelled(_))));
    }
}
