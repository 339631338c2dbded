use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{atempo_chain, concat_list, MediaCommand, MediaCommandBuilder, MediaProcessorTrait};
use crate::config::MediaConfig;
use crate::error::{DubError, Result};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder =
            MediaCommandBuilder::new(&config.binary_path, &config.probe_path, config.sample_rate);

        Self {
            config,
            command_builder,
        }
    }

    async fn execute(&self, command: MediaCommand, cancel: &CancellationToken) -> Result<std::process::Output> {
        command
            .into_external(self.config.timeout())
            .execute_with(cancel, DubError::Media)
            .await
    }
}

/// Parse `ffprobe -of json` output into seconds
pub fn parse_probe_duration(stdout: &str) -> Result<f64> {
    let value: serde_json::Value = serde_json::from_str(stdout)?;
    let raw = &value["format"]["duration"];
    let seconds = match raw {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    };
    seconds
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| DubError::Media(format!("ffprobe returned no usable duration: {}", raw)))
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn extract_mono_audio(&self, video_path: &Path, audio_path: &Path, cancel: &CancellationToken) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(video_path, audio_path);
        self.execute(command, cancel).await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn probe_duration(&self, media_path: &Path, cancel: &CancellationToken) -> Result<f64> {
        let command = self.command_builder.probe_duration(media_path);
        let output = self.execute(command, cancel).await?;
        let duration = parse_probe_duration(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Duration of {}: {:.3}s", media_path.display(), duration);
        Ok(duration)
    }

    async fn time_stretch(&self, input: &Path, output: &Path, tempo: f64, cancel: &CancellationToken) -> Result<()> {
        let chain = atempo_chain(tempo)
            .ok_or_else(|| DubError::Media(format!("Invalid tempo factor {}", tempo)))?;
        debug!("Stretching {} with {}", input.display(), chain);

        let command = self.command_builder.time_stretch(input, output, &chain);
        self.execute(command, cancel).await?;
        Ok(())
    }

    async fn pad_to_duration(
        &self,
        input: &Path,
        output: &Path,
        target_secs: f64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let command = self.command_builder.pad_to_duration(input, output, target_secs);
        self.execute(command, cancel).await?;
        Ok(())
    }

    async fn concat_audio(&self, inputs: &[PathBuf], output: &Path, cancel: &CancellationToken) -> Result<()> {
        if let Some(relative) = inputs.iter().find(|p| !p.is_absolute()) {
            return Err(DubError::Media(format!(
                "Concat input must be an absolute path: {}",
                relative.display()
            )));
        }
        let list_file = output.with_extension("concat.txt");
        tokio::fs::write(&list_file, concat_list(inputs)).await?;

        info!("Concatenating {} audio segments into {}", inputs.len(), output.display());
        let command = self.command_builder.concat_audio(list_file.as_path(), output);
        self.execute(command, cancel).await?;
        Ok(())
    }

    async fn transcode_to_wav(&self, input: &Path, output: &Path, cancel: &CancellationToken) -> Result<()> {
        let command = self.command_builder.transcode_to_wav(input, output);
        self.execute(command, cancel).await?;
        Ok(())
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path, cancel: &CancellationToken) -> Result<()> {
        info!("Muxing {} with {} -> {}", video.display(), audio.display(), output.display());
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let command = self.command_builder.mux(video, audio, output);
        self.execute(command, cancel).await?;
        Ok(())
    }

    async fn check_availability(&self, cancel: &CancellationToken) -> Result<String> {
        let output = self
            .execute(self.command_builder.version_check(), cancel)
            .await
            .map_err(|e| DubError::Media(format!("Media processor not found: {}", e)))?;

        let version_info = String::from_utf8_lossy(&output.stdout);
        let first_line = version_info.lines().next().unwrap_or("Unknown version").to_string();
        info!("Media processor is available: {}", first_line);
        Ok(first_line)
    }
}
