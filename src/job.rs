use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audio::GenderEstimate;
use crate::config::{DevicePolicy, GenderMode, PipelineConfig, SourceLangMode};
use crate::error::{DubError, Result};
use crate::lipsync::{GateDecision, LipSyncAttempt, OutputKind};
use crate::translate::{LanguageChoice, TranslatedChunk};

/// Everything needed to start one dubbing job
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub source_lang: SourceLangMode,
    pub target_lang: String,
    pub device: DevicePolicy,
    pub gender_mode: GenderMode,
    pub chunk_seconds: f64,
    pub verify_translation: bool,
}

impl JobRequest {
    /// Request for `input` using the pipeline defaults
    pub fn from_config<P: AsRef<Path>>(input: P, config: &PipelineConfig) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output_root: config.output_root.clone(),
            source_lang: config.source_lang,
            target_lang: config.target_lang.clone(),
            device: config.device,
            gender_mode: config.gender_mode,
            chunk_seconds: config.chunk_seconds,
            verify_translation: config.verify_translation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    AudioExtracted,
    GenderEstimated,
    Translated,
    Synthesized,
    Aligned,
    Gated,
    LipSynced,
    FallbackExported,
    Finalized,
    Failed,
}

impl JobState {
    /// Stages run strictly in order; `Failed` is reachable from any
    /// non-terminal state
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Created, AudioExtracted)
                | (AudioExtracted, GenderEstimated)
                | (GenderEstimated, Translated)
                | (Translated, Synthesized)
                | (Synthesized, Aligned)
                | (Aligned, Gated)
                | (Gated, LipSynced)
                | (Gated, FallbackExported)
                | (LipSynced, Finalized)
                | (FallbackExported, Finalized)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finalized | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::AudioExtracted => "audio_extracted",
            Self::GenderEstimated => "gender_estimated",
            Self::Translated => "translated",
            Self::Synthesized => "synthesized",
            Self::Aligned => "aligned",
            Self::Gated => "gated",
            Self::LipSynced => "lip_synced",
            Self::FallbackExported => "fallback_exported",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub state: JobState,
    pub at: DateTime<Local>,
}

/// Append-only `[HH:MM:SS] message` log inside the job directory
#[derive(Debug, Clone)]
pub struct JobLog {
    path: PathBuf,
}

impl JobLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, message: &str) -> Result<()> {
        let line = format!("[{}] {}\n", Local::now().format("%H:%M:%S"), message);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Files a finished job leaves behind
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactSet {
    pub video: Option<PathBuf>,
    pub output_kind: Option<OutputKind>,
    pub subtitles: Option<PathBuf>,
    pub transcript: Option<PathBuf>,
    pub log: PathBuf,
    pub report: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub start_s: f64,
    pub end_s: f64,
    pub strategy: String,
    pub score: Option<f64>,
    pub voice_id: Option<String>,
    pub synthesis_attempts: usize,
    pub notes: Vec<String>,
}

impl ChunkSummary {
    pub fn from_translation(chunk: &TranslatedChunk) -> Self {
        Self {
            index: chunk.index,
            start_s: chunk.start_s,
            end_s: chunk.end_s,
            strategy: chunk.strategy.to_string(),
            score: chunk.score,
            voice_id: None,
            synthesis_attempts: 0,
            notes: chunk.notes.clone(),
        }
    }
}

/// Diagnostics written to `job_report.json`
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub request: JobRequest,
    pub output_dir: PathBuf,
    pub state: JobState,
    pub history: Vec<StateChange>,
    pub language: Option<LanguageChoice>,
    pub gender: Option<GenderEstimate>,
    pub chunks: Vec<ChunkSummary>,
    pub gate: Option<GateDecision>,
    pub lipsync_attempts: Vec<LipSyncAttempt>,
    pub artifacts: ArtifactSet,
    pub failure: Option<String>,
    pub failure_kind: Option<String>,
}

/// One dubbing job: owns its output directory, state and report
pub struct Job {
    pub id: Uuid,
    pub request: JobRequest,
    pub stem: String,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub log: JobLog,
    state: JobState,
    history: Vec<StateChange>,
    pub report: JobReport,
}

impl Job {
    /// Validate the input and create `<stem>_pashto_<timestamp>/` under the
    /// absolute output root before any stage runs
    pub async fn create(mut request: JobRequest) -> Result<Self> {
        // external tools may run with another working directory
        request.input = std::path::absolute(&request.input)?;
        if !request.input.is_file() {
            return Err(DubError::FileNotFound(request.input.display().to_string()));
        }
        let stem = request
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DubError::InvalidInput(format!("Invalid video filename: {}", request.input.display())))?;

        let output_root = std::path::absolute(&request.output_root)?;
        let output_dir = unique_dir(&output_root, &stem).await?;
        let work_dir = output_dir.join("work");
        fs::create_dir_all(&work_dir).await?;

        let id = Uuid::new_v4();
        let log = JobLog::new(output_dir.join("pipeline.log"));
        let now = Local::now();
        let history = vec![StateChange {
            state: JobState::Created,
            at: now,
        }];
        let artifacts = ArtifactSet {
            log: log.path().to_path_buf(),
            report: output_dir.join("job_report.json"),
            ..Default::default()
        };
        let report = JobReport {
            job_id: id,
            request: request.clone(),
            output_dir: output_dir.clone(),
            state: JobState::Created,
            history: history.clone(),
            language: None,
            gender: None,
            chunks: Vec::new(),
            gate: None,
            lipsync_attempts: Vec::new(),
            artifacts,
            failure: None,
            failure_kind: None,
        };

        let job = Self {
            id,
            request,
            stem,
            output_dir,
            work_dir,
            log,
            state: JobState::Created,
            history,
            report,
        };
        job.log
            .append(&format!("Job {} created for {}", job.id, job.request.input.display()))
            .await?;
        info!("Job {} output directory: {}", job.id, job.output_dir.display());
        Ok(job)
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// Move to `next`, logging the transition. Out-of-order transitions are
    /// rejected.
    pub async fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(DubError::Config(format!(
                "Invalid job transition {} -> {}",
                self.state, next
            )));
        }
        debug!("Job {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        let change = StateChange {
            state: next,
            at: Local::now(),
        };
        self.history.push(change.clone());
        self.report.state = next;
        self.report.history.push(change);
        self.log.append(&format!("State: {}", next)).await
    }

    /// Record an unrecoverable error and enter `Failed`
    pub async fn fail(&mut self, error: &DubError) -> Result<()> {
        self.report.failure = Some(error.to_string());
        self.report.failure_kind = Some(error.kind().to_string());
        self.log
            .append(&format!("FAILED ({}): {}", error.kind(), error))
            .await?;
        if !self.state.is_terminal() {
            self.advance(JobState::Failed).await?;
        }
        Ok(())
    }

    pub async fn write_report(&self) -> Result<PathBuf> {
        let path = self.report.artifacts.report.clone();
        let json = serde_json::to_string_pretty(&self.report)?;
        fs::write(&path, json).await?;
        Ok(path)
    }
}

/// `<stem>_pashto_<YYYYmmdd_HHMMSS>`, with a numeric suffix if that exists
async fn unique_dir(root: &Path, stem: &str) -> Result<PathBuf> {
    fs::create_dir_all(root).await?;
    let base = format!("{}_pashto_{}", stem, Local::now().format("%Y%m%d_%H%M%S"));
    let mut candidate = root.join(&base);
    let mut n = 1;
    loop {
        match fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = root.join(format!("{}_{}", base, n));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path) -> JobRequest {
        let input = dir.join("talk.mp4");
        std::fs::write(&input, b"video").unwrap();
        let mut config = PipelineConfig::default();
        config.output_root = dir.join("out");
        JobRequest::from_config(input, &config)
    }

    #[test]
    fn test_transitions_are_sequential() {
        use JobState::*;
        assert!(Created.can_advance_to(AudioExtracted));
        assert!(!Created.can_advance_to(Translated));
        assert!(Gated.can_advance_to(LipSynced));
        assert!(Gated.can_advance_to(FallbackExported));
        assert!(!LipSynced.can_advance_to(FallbackExported));
        assert!(Synthesized.can_advance_to(Failed));
        assert!(!Finalized.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(JobState::FallbackExported.to_string(), "fallback_exported");
    }

    #[tokio::test]
    async fn test_job_creates_unique_directories() {
        let dir = tempfile::tempdir().unwrap();
        let first = Job::create(request(dir.path())).await.unwrap();
        let second = Job::create(request(dir.path())).await.unwrap();

        assert_ne!(first.output_dir, second.output_dir);
        assert!(first.output_dir.is_absolute());
        assert!(first.work_dir.is_dir());
        let name = first.output_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("talk_pashto_"));
    }

    #[tokio::test]
    async fn test_advance_rejects_skips_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Job::create(request(dir.path())).await.unwrap();

        job.advance(JobState::AudioExtracted).await.unwrap();
        assert!(job.advance(JobState::Aligned).await.is_err());
        job.fail(&DubError::Validation("chunk 2 exhausted".to_string()))
            .await
            .unwrap();

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.history().len(), 3);
        let log = std::fs::read_to_string(job.log.path()).unwrap();
        assert!(log.contains("State: audio_extracted"));
        assert!(log.contains("FAILED (validation)"));
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path());
        req.input = dir.path().join("missing.mp4");
        assert!(matches!(Job::create(req).await, Err(DubError::FileNotFound(_))));
    }
}
