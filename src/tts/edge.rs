use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SpeechSynthesizer;
use crate::config::TtsConfig;
use crate::error::{DubError, Result};
use crate::media::MediaProcessorTrait;
use crate::process::ExternalCommand;

/// Smaller mp3 files are truncated or error pages
const MIN_MP3_BYTES: u64 = 2048;

/// Neural voices through the `edge-tts` command line tool
pub struct EdgeTtsSynthesizer {
    command: Vec<String>,
    timeout: Duration,
    media: Arc<dyn MediaProcessorTrait>,
}

impl EdgeTtsSynthesizer {
    pub fn new(config: &TtsConfig, media: Arc<dyn MediaProcessorTrait>) -> Result<Self> {
        if config.edge_tts_command.is_empty() {
            return Err(DubError::Config("tts.edge_tts_command must not be empty".to_string()));
        }
        Ok(Self {
            command: config.edge_tts_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            media,
        })
    }

    fn build_command(&self, voice: &str, text_file: &Path, mp3_path: &Path, route: Option<&str>) -> ExternalCommand {
        let mut cmd = ExternalCommand::new(&self.command[0], "edge-tts synthesis")
            .args(self.command[1..].iter().cloned())
            .arg("--voice")
            .arg(voice)
            .arg("--file")
            .path_arg(text_file)
            .arg("--write-media")
            .path_arg(mp3_path)
            .timeout(self.timeout);
        if let Some(proxy) = route {
            cmd = cmd.arg("--proxy").arg(proxy);
        }
        cmd
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        route: Option<&str>,
        out_wav: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let text_file = scratch.path().join("edge_input.txt");
        let mp3_path = scratch.path().join("tts.mp3");
        tokio::fs::write(&text_file, text).await?;

        debug!("edge-tts voice={}, proxy={}", voice, route.unwrap_or("none"));
        self.build_command(voice, &text_file, &mp3_path, route)
            .execute_with(cancel, DubError::Transport)
            .await?;

        let size = tokio::fs::metadata(&mp3_path).await.map(|m| m.len()).unwrap_or(0);
        if size < MIN_MP3_BYTES {
            return Err(DubError::Transport(format!(
                "edge-tts output mp3 missing or too small ({} bytes)",
                size
            )));
        }

        self.media.transcode_to_wav(&mp3_path, out_wav, cancel).await
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<()> {
        ExternalCommand::new(&self.command[0], "edge-tts availability")
            .args(self.command[1..].iter().cloned())
            .arg("--help")
            .timeout(Duration::from_secs(30))
            .execute_with(cancel, DubError::Config)
            .await?;
        Ok(())
    }
}
