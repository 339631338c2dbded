// Media processing abstraction
//
// Decoding, encoding and muxing are delegated to ffmpeg/ffprobe:
// - Processor: trait implementation running ffmpeg as a child process
// - Commands: argument builders and the atempo/concat helpers

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Media operations consumed by the pipeline. Every output is a mono WAV at
/// the pipeline sample rate unless stated otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Extract the first audio stream as mono PCM
    async fn extract_mono_audio(&self, video_path: &Path, audio_path: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Duration of any media file in seconds
    async fn probe_duration(&self, media_path: &Path, cancel: &CancellationToken) -> Result<f64>;

    /// Change tempo without changing pitch; `tempo` > 1 shortens
    async fn time_stretch(&self, input: &Path, output: &Path, tempo: f64, cancel: &CancellationToken) -> Result<()>;

    /// Append silence until `target_secs` is reached
    async fn pad_to_duration(
        &self,
        input: &Path,
        output: &Path,
        target_secs: f64,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Join segments in order. Inputs must be absolute paths.
    async fn concat_audio(&self, inputs: &[PathBuf], output: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Convert any audio file to pipeline WAV
    async fn transcode_to_wav(&self, input: &Path, output: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Replace the audio of `video` with `audio`, copying the video stream
    async fn mux(&self, video: &Path, audio: &Path, output: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Version line of the media tool, or an error when it is missing
    async fn check_availability(&self, cancel: &CancellationToken) -> Result<String>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Arc<dyn MediaProcessorTrait> {
        Arc::new(processor::MediaProcessorImpl::new(config))
    }
}
