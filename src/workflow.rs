use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::align::{AlignSegment, AudioAligner};
use crate::audio::{activity_ratio, read_wav, GenderEstimate};
use crate::chunk::ChunkPlanner;
use crate::config::{Config, GenderMode};
use crate::error::{DubError, Result};
use crate::job::{ChunkSummary, Job, JobReport, JobRequest, JobState};
use crate::lipsync::{self, GateDecision, LipSyncRunner, OutputKind};
use crate::services::Services;
use crate::subtitle::{generate_srt, write_transcript};
use crate::translate::TranslationVerifier;
use crate::tts::{discover_routes, SynthesisRetryEngine, VoiceSelector};

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];
const STAGE_COUNT: u64 = 8;

/// Result of a directory run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<JobReport>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Runs dubbing jobs stage by stage over a shared set of services
pub struct Workflow {
    config: Config,
    services: Services,
    show_progress: bool,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Ok(Self::with_services(config, services))
    }

    pub fn with_services(config: Config, services: Services) -> Self {
        Self {
            config,
            services,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Check the external collaborators
    pub async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        self.services.init(cancel).await
    }

    pub fn shutdown(self) {
        self.services.shutdown();
    }

    /// Process a single video file with the configured pipeline defaults
    pub async fn process_single_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        cancel: &CancellationToken,
    ) -> Result<JobReport> {
        let request = JobRequest::from_config(input_path, &self.config.pipeline);
        self.run_job(request, cancel).await
    }

    /// Process all video files in a directory. A failed job is recorded and
    /// the batch continues; cancellation stops the batch.
    pub async fn process_directory<P: AsRef<Path>>(
        &self,
        input_dir: P,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(DubError::InvalidInput(format!(
                "Input path is not a directory: {}",
                input_dir.display()
            )));
        }

        let video_files = find_videos(input_dir);
        info!("Found {} video files to process", video_files.len());

        let mut summary = BatchSummary::default();
        for video_path in video_files {
            match self.process_single_file(&video_path, cancel).await {
                Ok(report) => {
                    info!("Successfully processed: {}", video_path.display());
                    summary.succeeded.push(report);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Failed to process {}: {}", video_path.display(), e);
                    summary.failed.push((video_path, e.to_string()));
                }
            }
        }
        Ok(summary)
    }

    /// Run one job to a terminal state. On failure the reason is logged and
    /// the report written before the error is returned.
    pub async fn run_job(&self, request: JobRequest, cancel: &CancellationToken) -> Result<JobReport> {
        let mut job = Job::create(request).await?;
        let progress = self.progress_bar(&job.stem);

        let outcome = self.execute(&mut job, &progress, cancel).await;
        progress.finish_and_clear();

        match outcome {
            Ok(()) => {
                job.write_report().await?;
                info!("Job {} finalized: {:?}", job.id, job.report.artifacts.video);
                Ok(job.report)
            }
            Err(e) => {
                warn!("Job {} failed ({}): {}", job.id, e.kind(), e);
                job.fail(&e).await?;
                job.write_report().await?;
                Err(e)
            }
        }
    }

    async fn execute(&self, job: &mut Job, progress: &ProgressBar, cancel: &CancellationToken) -> Result<()> {
        let config = &self.config;
        let services = &self.services;
        let input = job.request.input.clone();

        // Audio extraction
        checkpoint(cancel, "audio extraction")?;
        progress.set_message("extracting audio");
        let audio_path = job.work_dir.join("source_audio.wav");
        services.media.extract_mono_audio(&input, &audio_path, cancel).await?;
        let track = read_wav(&audio_path)?;
        if track.is_empty() {
            return Err(DubError::InvalidInput(format!("{} has no audio", input.display())));
        }
        job.log
            .append(&format!("Extracted {:.2}s of source audio", track.duration_secs()))
            .await?;
        job.advance(JobState::AudioExtracted).await?;
        progress.inc(1);

        // Speaker gender
        checkpoint(cancel, "gender estimation")?;
        progress.set_message("estimating speaker gender");
        let estimate = match job.request.gender_mode {
            GenderMode::Auto => services.gender.estimate(&track),
            forced => GenderEstimate::unknown(format!("voice gender forced to {:?}", forced), 0.0),
        };
        job.log
            .append(&format!("Speaker gender: {:?} ({})", estimate.gender, estimate.reason))
            .await?;
        let estimated_gender = estimate.gender;
        job.report.gender = Some(estimate);
        job.advance(JobState::GenderEstimated).await?;
        progress.inc(1);

        // Chunking and translation
        checkpoint(cancel, "translation")?;
        progress.set_message("translating");
        let planner = ChunkPlanner::new(
            job.request.chunk_seconds,
            config.pipeline.min_chunk_seconds,
            config.pipeline.trailing_merge_seconds,
        );
        let chunks = planner.plan(&track)?;
        job.log.append(&format!("Planned {} chunks", chunks.len())).await?;

        let verifier = TranslationVerifier::new(
            services.translator.clone(),
            &config.translate,
            &job.request.target_lang,
            job.request.verify_translation,
        );
        let probe = &chunks[0];
        let language = verifier
            .resolve_language(
                job.request.source_lang,
                config.pipeline.fallback_source_lang,
                &probe.samples,
                probe.sample_rate,
                cancel,
            )
            .await?;
        job.log.append(&language.note).await?;
        let source_lang = language.language;
        job.report.language = Some(language);

        let translated = verifier.translate_all(&chunks, source_lang, cancel).await?;
        for chunk in &translated {
            job.log
                .append(&format!(
                    "Chunk {}: strategy={} score={}",
                    chunk.index + 1,
                    chunk.strategy,
                    chunk.score.map_or("n/a".to_string(), |s| format!("{:.3}", s))
                ))
                .await?;
        }
        job.report.chunks = translated.iter().map(ChunkSummary::from_translation).collect();
        job.advance(JobState::Translated).await?;
        progress.inc(1);

        // Speech synthesis
        checkpoint(cancel, "speech synthesis")?;
        progress.set_message("synthesizing speech");
        let voices = VoiceSelector::from_config(&config.tts).rank(job.request.gender_mode, estimated_gender);
        let routes = if services.synthesizer.supports_routes() {
            discover_routes(&config.tts).await
        } else {
            vec![None]
        };
        job.log
            .append(&format!(
                "Voices: {} | routes: {}",
                voices.iter().map(|v| v.voice_id.as_str()).collect::<Vec<_>>().join(", "),
                routes.len()
            ))
            .await?;
        let engine = SynthesisRetryEngine::new(services.synthesizer.clone(), &config.tts, &config.align);
        let synthesized = engine
            .synthesize_all(&translated, &voices, &routes, &job.work_dir, cancel)
            .await?;
        for (summary, chunk) in job.report.chunks.iter_mut().zip(&synthesized) {
            summary.voice_id = Some(chunk.voice_id.clone());
            summary.synthesis_attempts = chunk.attempts.len();
        }
        job.advance(JobState::Synthesized).await?;
        progress.inc(1);

        // Alignment
        checkpoint(cancel, "alignment")?;
        progress.set_message("aligning audio");
        let video_secs = services.media.probe_duration(&input, cancel).await?;
        let segments: Vec<AlignSegment> = synthesized
            .iter()
            .zip(&translated)
            .map(|(audio, text)| AlignSegment {
                index: audio.index,
                path: audio.path.clone(),
                target_secs: text.end_s - text.start_s,
            })
            .collect();
        let aligner = AudioAligner::new(services.media.clone(), services.vad.clone(), config.align.clone());
        let alignment = aligner.align(&segments, video_secs, &job.work_dir, cancel).await?;
        job.log
            .append(&format!(
                "Aligned dub track {:.2}s for video {:.2}s (peak {:.4}, active {:.2})",
                alignment.duration_secs, video_secs, alignment.levels.peak, alignment.active_fraction
            ))
            .await?;
        job.advance(JobState::Aligned).await?;
        progress.inc(1);

        // Lip-sync gate
        checkpoint(cancel, "lip-sync gate")?;
        progress.set_message("checking lip-sync eligibility");
        let decision = self.evaluate_gate(&input, &alignment.track_path, cancel).await?;
        job.log
            .append(&format!(
                "Gate: eligible={} face_ratio={:.2} speech_ratio={:.2} ({})",
                decision.eligible, decision.face_ratio, decision.speech_ratio, decision.reason
            ))
            .await?;
        job.report.gate = Some(decision.clone());
        job.advance(JobState::Gated).await?;
        progress.inc(1);

        // Subtitles are staged in work/ before any video is exported
        let srt_path = job.work_dir.join("pashto_translation.srt");
        let transcript_path = job.work_dir.join("pashto_translation.txt");
        generate_srt(&translated, &srt_path).await?;
        write_transcript(&translated, &transcript_path).await?;

        // Lip-sync or fallback export
        checkpoint(cancel, "lip-sync")?;
        progress.set_message("rendering video");
        let runner = LipSyncRunner::new(
            services.lipsync.clone(),
            services.media.clone(),
            &config.lipsync,
            job.request.device,
        );
        let outcome = runner
            .run(&decision, &input, &alignment.track_path, &job.output_dir, &job.stem, cancel)
            .await?;
        for attempt in &outcome.attempts {
            job.log
                .append(&format!(
                    "Lip-sync {}: {}",
                    attempt.config,
                    attempt.reason.as_deref().unwrap_or("ok")
                ))
                .await?;
        }
        job.report.lipsync_attempts = outcome.attempts;
        job.advance(match outcome.kind {
            OutputKind::LipSync => JobState::LipSynced,
            OutputKind::Dubbed => JobState::FallbackExported,
        })
        .await?;
        progress.inc(1);

        // Finalization
        let published = async {
            let srt = publish(&srt_path, &job.output_dir).await?;
            let transcript = publish(&transcript_path, &job.output_dir).await?;
            Ok::<_, DubError>((srt, transcript))
        }
        .await;
        let (srt_path, transcript_path) = match published {
            Ok(paths) => paths,
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&outcome.path).await {
                    warn!("Could not remove {}: {}", outcome.path.display(), remove_err);
                }
                return Err(e);
            }
        };

        let artifacts = &mut job.report.artifacts;
        artifacts.video = Some(outcome.path.clone());
        artifacts.output_kind = Some(outcome.kind);
        artifacts.subtitles = Some(srt_path);
        artifacts.transcript = Some(transcript_path);
        job.log
            .append(&format!("Final video: {}", outcome.path.display()))
            .await?;
        job.advance(JobState::Finalized).await?;
        progress.inc(1);
        Ok(())
    }

    /// Gate decision for `video` against a dubbed track. A face tracker
    /// failure makes the video ineligible rather than failing the job.
    pub async fn evaluate_gate(
        &self,
        video: &Path,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<GateDecision> {
        let track = read_wav(audio)?;
        let activity = self.services.vad.voice_activity(&track);

        if !self.config.lipsync.enabled {
            return Ok(GateDecision {
                speech_ratio: activity_ratio(&activity),
                ..GateDecision::ineligible("Lip-sync disabled by configuration.")
            });
        }

        match self.services.face_tracker.face_track(video, cancel).await {
            Ok(faces) => Ok(lipsync::evaluate(&faces, &activity, &self.config.gate)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Face tracking failed, skipping lip-sync: {}", e);
                Ok(GateDecision {
                    speech_ratio: activity_ratio(&activity),
                    ..GateDecision::ineligible(format!("Face tracking unavailable: {}", e))
                })
            }
        }
    }

    /// Extract the mono pipeline WAV from a video
    pub async fn extract_audio<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: Q,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let video_path = video_path.as_ref();
        if !video_path.is_file() {
            return Err(DubError::FileNotFound(video_path.display().to_string()));
        }
        self.services
            .media
            .extract_mono_audio(video_path, audio_path.as_ref(), cancel)
            .await
    }

    fn progress_bar(&self, stem: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(STAGE_COUNT);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_prefix(stem.to_string());
        pb
    }
}

/// Move a finished artifact from the work directory into the job folder
async fn publish(staged: &Path, output_dir: &Path) -> Result<PathBuf> {
    let file_name = staged
        .file_name()
        .ok_or_else(|| DubError::Media(format!("artifact has no file name: {}", staged.display())))?;
    let target = output_dir.join(file_name);
    tokio::fs::rename(staged, &target).await?;
    Ok(target)
}

fn checkpoint(cancel: &CancellationToken, stage: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(DubError::Cancelled(format!("job cancelled before {}", stage)));
    }
    Ok(())
}

/// Video files under `dir`, sorted for a stable processing order
pub fn find_videos(dir: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    videos.sort();
    videos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_videos_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        for name in ["b.MP4", "a.mkv", "notes.txt", "nested/c.webm"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let names: Vec<String> = find_videos(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.MP4", "c.webm"]);
    }
}
