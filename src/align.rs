use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::{activity_ratio, read_wav, AudioLevels, VoiceActivityDetector};
use crate::config::AlignConfig;
use crate::error::{DubError, Result};
use crate::media::MediaProcessorTrait;

/// Differences below this are left as they are
const NEGLIGIBLE_SECS: f64 = 0.01;

/// Synthesized audio for one chunk and the span it must fill
#[derive(Debug, Clone)]
pub struct AlignSegment {
    pub index: usize,
    pub path: PathBuf,
    pub target_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitAction {
    /// Already on target, or a small overrun
    Copied,
    /// Sped up or slowed down to the target
    Stretched,
    /// Silence appended up to the target
    Padded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkFit {
    pub index: usize,
    pub action: FitAction,
    pub source_secs: f64,
    pub target_secs: f64,
    /// Duration of the fitted audio
    pub output_secs: f64,
    pub path: PathBuf,
}

/// Per-chunk fitted audio plus the duration-matched full track
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentResult {
    pub chunks: Vec<ChunkFit>,
    pub track_path: PathBuf,
    pub duration_secs: f64,
    pub target_secs: f64,
    pub levels: AudioLevels,
    pub active_fraction: f64,
}

/// Fits synthesized speech to source timing and produces the final dub track
pub struct AudioAligner {
    media: Arc<dyn MediaProcessorTrait>,
    vad: Arc<dyn VoiceActivityDetector>,
    config: AlignConfig,
}

impl AudioAligner {
    pub fn new(media: Arc<dyn MediaProcessorTrait>, vad: Arc<dyn VoiceActivityDetector>, config: AlignConfig) -> Self {
        Self { media, vad, config }
    }

    /// Pad any underrun to the exact target. An overrun up to
    /// `overrun_tolerance` is copied, a larger one is stretched. Speech is
    /// never truncated.
    pub async fn fit(
        &self,
        input: &Path,
        output: &Path,
        target_secs: f64,
        overrun_tolerance: f64,
        cancel: &CancellationToken,
    ) -> Result<(FitAction, f64)> {
        let source_secs = self.media.probe_duration(input, cancel).await?;
        let diff = source_secs - target_secs;
        let keep = target_secs <= 0.0 || diff.abs() <= NEGLIGIBLE_SECS || (diff > 0.0 && diff <= overrun_tolerance);
        let action = if keep {
            tokio::fs::copy(input, output).await?;
            FitAction::Copied
        } else if diff > 0.0 {
            self.media
                .time_stretch(input, output, source_secs / target_secs, cancel)
                .await?;
            FitAction::Stretched
        } else {
            self.media.pad_to_duration(input, output, target_secs, cancel).await?;
            FitAction::Padded
        };
        debug!(
            "Fit {} ({:.2}s -> {:.2}s): {:?}",
            input.display(),
            source_secs,
            target_secs,
            action
        );
        Ok((action, source_secs))
    }

    /// Fit each segment, concatenate in index order and match the total to
    /// `video_secs`. A copied overrun shortens the next target, so every
    /// chunk starts within `chunk_tolerance_secs` of its source time.
    pub async fn align(
        &self,
        segments: &[AlignSegment],
        video_secs: f64,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<AlignmentResult> {
        if segments.is_empty() {
            return Err(DubError::Alignment("no synthesized audio to align".to_string()));
        }
        if segments.windows(2).any(|w| w[0].index >= w[1].index) {
            return Err(DubError::Alignment("segments are not in chunk order".to_string()));
        }

        // Every path is resolved before the concat list is written.
        let work_dir = std::path::absolute(work_dir)?;
        let mut fits = Vec::with_capacity(segments.len());
        let mut planned_end = 0.0;
        let mut placed = 0.0;
        for segment in segments {
            let input = std::path::absolute(&segment.path)?;
            let output = work_dir.join(format!("tts_fit_{:04}.wav", segment.index + 1));
            planned_end += segment.target_secs.max(self.config.min_chunk_target_secs);
            let target = (planned_end - placed).max(self.config.min_chunk_target_secs);
            let (action, source_secs) = self
                .fit(&input, &output, target, self.config.chunk_tolerance_secs, cancel)
                .await?;
            let output_secs = match action {
                FitAction::Copied => source_secs,
                FitAction::Stretched | FitAction::Padded => target,
            };
            placed += output_secs;
            fits.push(ChunkFit {
                index: segment.index,
                action,
                source_secs,
                target_secs: target,
                output_secs,
                path: output,
            });
        }

        let concat_path = work_dir.join("dubbed_concat.wav");
        let inputs: Vec<PathBuf> = fits.iter().map(|f| f.path.clone()).collect();
        self.media.concat_audio(&inputs, &concat_path, cancel).await?;

        let track_path = work_dir.join("dubbed_audio.wav");
        self.fit(&concat_path, &track_path, video_secs, self.config.total_tolerance_secs, cancel)
            .await?;

        let result = self.verify(fits, track_path, video_secs)?;
        info!(
            "Aligned dub track: {:.2}s (video {:.2}s), active fraction {:.2}",
            result.duration_secs, video_secs, result.active_fraction
        );
        Ok(result)
    }

    /// Last check before export: the track must exist, match the video and
    /// carry audible speech
    fn verify(&self, chunks: Vec<ChunkFit>, track_path: PathBuf, target_secs: f64) -> Result<AlignmentResult> {
        let track = read_wav(&track_path)
            .map_err(|e| DubError::Alignment(format!("aligned track unreadable: {}", e)))?;
        if track.is_empty() {
            return Err(DubError::Alignment("aligned track is empty".to_string()));
        }

        let duration_secs = track.duration_secs();
        if target_secs > 0.0 && (duration_secs - target_secs).abs() > self.config.total_tolerance_secs {
            return Err(DubError::Alignment(format!(
                "aligned track is {:.2}s but the video is {:.2}s",
                duration_secs, target_secs
            )));
        }

        let levels = track.levels();
        if levels.is_near_silent(self.config.silence_peak, self.config.silence_rms) {
            return Err(DubError::Alignment(format!(
                "aligned track is near-silent (peak {:.5}, rms {:.5})",
                levels.peak, levels.rms
            )));
        }

        let active_fraction = activity_ratio(&self.vad.voice_activity(&track));
        if active_fraction < self.config.min_active_fraction {
            return Err(DubError::Alignment(format!(
                "aligned track has too little speech ({:.3} < {:.3})",
                active_fraction, self.config.min_active_fraction
            )));
        }

        Ok(AlignmentResult {
            chunks,
            track_path,
            duration_secs,
            target_secs,
            levels,
            active_fraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{silence, sine};
    use crate::audio::{write_wav, AudioTrack, EnergyVad, PIPELINE_SAMPLE_RATE};
    use async_trait::async_trait;

    /// Sample-level stand-in for ffmpeg operating on WAV files
    struct WavMedia;

    #[async_trait]
    impl MediaProcessorTrait for WavMedia {
        async fn extract_mono_audio(&self, _: &Path, _: &Path, _: &CancellationToken) -> Result<()> {
            unreachable!()
        }

        async fn probe_duration(&self, path: &Path, _: &CancellationToken) -> Result<f64> {
            Ok(read_wav(path)?.duration_secs())
        }

        async fn time_stretch(&self, input: &Path, output: &Path, tempo: f64, _: &CancellationToken) -> Result<()> {
            let track = read_wav(input)?;
            let n = (track.samples.len() as f64 / tempo).round() as usize;
            let samples = (0..n)
                .map(|i| track.samples[((i as f64 * tempo) as usize).min(track.samples.len() - 1)])
                .collect();
            write_wav(output, &AudioTrack::new(samples, track.sample_rate))
        }

        async fn pad_to_duration(&self, input: &Path, output: &Path, secs: f64, _: &CancellationToken) -> Result<()> {
            let mut track = read_wav(input)?;
            let n = (secs * track.sample_rate as f64).round() as usize;
            track.samples.resize(n.max(track.samples.len()), 0.0);
            write_wav(output, &track)
        }

        async fn concat_audio(&self, inputs: &[PathBuf], output: &Path, _: &CancellationToken) -> Result<()> {
            assert!(inputs.iter().all(|p| p.is_absolute()));
            let mut samples = Vec::new();
            for input in inputs {
                samples.extend(read_wav(input)?.samples);
            }
            write_wav(output, &AudioTrack::new(samples, PIPELINE_SAMPLE_RATE))
        }

        async fn transcode_to_wav(&self, input: &Path, output: &Path, _: &CancellationToken) -> Result<()> {
            tokio::fs::copy(input, output).await?;
            Ok(())
        }

        async fn mux(&self, _: &Path, _: &Path, _: &Path, _: &CancellationToken) -> Result<()> {
            unreachable!()
        }

        async fn check_availability(&self, _: &CancellationToken) -> Result<String> {
            Ok("wav".to_string())
        }
    }

    fn aligner() -> AudioAligner {
        AudioAligner::new(Arc::new(WavMedia), Arc::new(EnergyVad::default()), AlignConfig::default())
    }

    fn segment(dir: &Path, index: usize, track: &AudioTrack, target_secs: f64) -> AlignSegment {
        let path = dir.join(format!("raw_{}.wav", index));
        write_wav(&path, track).unwrap();
        AlignSegment { index, path, target_secs }
    }

    #[tokio::test]
    async fn test_overrun_is_stretched_and_underrun_padded() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let segments = vec![
            segment(dir.path(), 0, &sine(220.0, 6.0, 0.3, PIPELINE_SAMPLE_RATE), 4.0),
            segment(dir.path(), 1, &sine(220.0, 2.0, 0.3, PIPELINE_SAMPLE_RATE), 6.0),
        ];

        let result = aligner().align(&segments, 10.0, dir.path(), &cancel).await.unwrap();

        assert_eq!(result.chunks[0].action, FitAction::Stretched);
        assert_eq!(result.chunks[1].action, FitAction::Padded);
        assert!((result.duration_secs - 10.0).abs() <= 0.35);
        assert!(result.active_fraction > 0.2);
        assert!(result.track_path.is_absolute());
    }

    #[tokio::test]
    async fn test_realigning_aligned_audio_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let track = sine(220.0, 5.0, 0.3, PIPELINE_SAMPLE_RATE);
        let segments = vec![segment(dir.path(), 0, &track, 5.0)];

        let result = aligner().align(&segments, 5.0, dir.path(), &cancel).await.unwrap();
        assert_eq!(result.chunks[0].action, FitAction::Copied);
        let aligned = read_wav(&result.track_path).unwrap();
        assert_eq!(aligned.samples.len(), track.samples.len());
    }

    #[tokio::test]
    async fn test_silent_track_is_alignment_error() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let segments = vec![segment(dir.path(), 0, &silence(3.0, PIPELINE_SAMPLE_RATE), 3.0)];

        let result = aligner().align(&segments, 3.0, dir.path(), &cancel).await;
        assert!(matches!(result, Err(DubError::Alignment(_))));
    }

    #[tokio::test]
    async fn test_short_chunks_keep_source_timing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let speech = sine(220.0, 1.7, 0.3, PIPELINE_SAMPLE_RATE);
        let segments: Vec<AlignSegment> = (0..10).map(|i| segment(dir.path(), i, &speech, 2.0)).collect();

        let result = aligner().align(&segments, 20.0, dir.path(), &cancel).await.unwrap();
        assert!(result.chunks.iter().all(|c| c.action == FitAction::Padded));

        let track = read_wav(&result.track_path).unwrap();
        let sr = track.sample_rate as f64;
        let slot = |from: f64, to: f64| AudioLevels::measure(&track.samples[(from * sr) as usize..(to * sr) as usize]);
        for i in 0..10 {
            let start = 2.0 * i as f64;
            assert!(slot(start + 0.05, start + 1.65).rms > 0.1, "chunk {} lost its slot", i);
            assert!(slot(start + 1.75, start + 1.95).rms < 1e-3, "chunk {} spills over", i);
        }
    }

    #[tokio::test]
    async fn test_small_overruns_do_not_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let speech = sine(220.0, 2.2, 0.3, PIPELINE_SAMPLE_RATE);
        let segments: Vec<AlignSegment> = (0..6).map(|i| segment(dir.path(), i, &speech, 2.0)).collect();

        let result = aligner().align(&segments, 12.0, dir.path(), &cancel).await.unwrap();

        let mut start = 0.0;
        for (i, fit) in result.chunks.iter().enumerate() {
            assert!((start - 2.0 * i as f64).abs() <= 0.35, "chunk {} starts at {:.2}s", i, start);
            start += fit.output_secs;
        }
        assert_eq!(result.chunks[0].action, FitAction::Copied);
        assert_eq!(result.chunks[1].action, FitAction::Stretched);
        assert!((result.duration_secs - 12.0).abs() <= 0.35);
    }

    #[tokio::test]
    async fn test_isolated_blip_fails_active_fraction() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let mut track = sine(220.0, 0.3, 0.5, PIPELINE_SAMPLE_RATE);
        track.samples.extend(silence(29.7, PIPELINE_SAMPLE_RATE).samples);
        assert!(!track.levels().is_near_silent(0.003, 0.0008));
        let segments = vec![segment(dir.path(), 0, &track, 30.0)];

        let result = aligner().align(&segments, 30.0, dir.path(), &cancel).await;
        match result {
            Err(DubError::Alignment(msg)) => assert!(msg.contains("too little speech"), "{}", msg),
            other => panic!("expected alignment error, got {:?}", other.map(|r| r.active_fraction)),
        }
    }

    #[tokio::test]
    async fn test_empty_segments_is_alignment_error() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let result = aligner().align(&[], 3.0, dir.path(), &cancel).await;
        assert!(matches!(result, Err(DubError::Alignment(_))));
    }
}
