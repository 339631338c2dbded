use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::SpeechSynthesizer;
use crate::config::TtsConfig;
use crate::error::{DubError, Result};
use crate::media::MediaProcessorTrait;
use crate::process::ExternalCommand;

/// Offline formant synthesis. Ignores the ranked voice id and network routes.
pub struct EspeakSynthesizer {
    binary_path: String,
    voice: String,
    timeout: Duration,
    media: Arc<dyn MediaProcessorTrait>,
}

impl EspeakSynthesizer {
    pub fn new(config: &TtsConfig, media: Arc<dyn MediaProcessorTrait>) -> Self {
        Self {
            binary_path: config.espeak_command.clone(),
            voice: config.espeak_voice.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            media,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for EspeakSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        _route: Option<&str>,
        out_wav: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let raw = scratch.path().join("espeak.wav");

        ExternalCommand::new(&self.binary_path, "eSpeak synthesis")
            .arg("-v")
            .arg(&self.voice)
            .arg("-w")
            .path_arg(&raw)
            .arg(text)
            .timeout(self.timeout)
            .execute_with(cancel, DubError::Validation)
            .await?;

        // espeak writes 22.05 kHz; bring it to the pipeline format
        self.media.transcode_to_wav(&raw, out_wav, cancel).await
    }

    fn supports_routes(&self) -> bool {
        false
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<()> {
        ExternalCommand::new(&self.binary_path, "eSpeak availability")
            .arg("--version")
            .timeout(Duration::from_secs(30))
            .execute_with(cancel, DubError::Config)
            .await?;
        Ok(())
    }
}
