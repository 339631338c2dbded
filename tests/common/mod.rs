//! Stub collaborators for end-to-end pipeline tests.
//!
//! "Videos" are WAV files: extraction copies them, muxing copies the dubbed
//! track into the output, and every other media operation works on samples.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use pashto_dub::audio::{
    read_wav, write_wav, AudioTrack, EnergyVad, PitchGenderEstimator, PIPELINE_SAMPLE_RATE,
};
use pashto_dub::config::Config;
use pashto_dub::error::{DubError, Result};
use pashto_dub::lipsync::{FaceBox, FaceObservation, FaceTracker, LipSyncRequest, LipSyncService};
use pashto_dub::media::MediaProcessorTrait;
use pashto_dub::services::Services;
use pashto_dub::translate::TranslationService;
use pashto_dub::tts::SpeechSynthesizer;

pub const PASHTO_TEXT: &str = "سلام دا یوه ازموینه ده";
pub const ENGLISH_TEXT: &str = "hello this is a short test";

pub fn tone(seconds: f64) -> AudioTrack {
    let sr = PIPELINE_SAMPLE_RATE;
    let n = (seconds * sr as f64) as usize;
    let samples = (0..n)
        .map(|i| {
            let t = i as f32 / sr as f32;
            let envelope = 0.3 + 0.2 * (2.0 * std::f32::consts::PI * 1.5 * t).sin();
            envelope * (2.0 * std::f32::consts::PI * 210.0 * t).sin()
        })
        .collect();
    AudioTrack::new(samples, sr)
}

/// Write a fake video whose audio is a spoken-like tone
pub fn write_video(path: &Path, seconds: f64) {
    write_wav(path, &tone(seconds)).unwrap();
}

pub fn test_config(output_root: &Path) -> Config {
    let mut config = Config::default();
    config.pipeline.output_root = output_root.to_path_buf();
    config.pipeline.chunk_seconds = 4.0;
    config.translate.term_overrides_path = None;
    config.tts.retry_delay_ms = 0;
    config.tts.probe_local_proxy_ports = Vec::new();
    config
}

pub struct WavMedia;

#[async_trait]
impl MediaProcessorTrait for WavMedia {
    async fn extract_mono_audio(&self, video: &Path, audio: &Path, _: &CancellationToken) -> Result<()> {
        tokio::fs::copy(video, audio).await?;
        Ok(())
    }

    async fn probe_duration(&self, path: &Path, _: &CancellationToken) -> Result<f64> {
        Ok(read_wav(path)?.duration_secs())
    }

    async fn time_stretch(&self, input: &Path, output: &Path, tempo: f64, _: &CancellationToken) -> Result<()> {
        let track = read_wav(input)?;
        let n = (track.samples.len() as f64 / tempo).round() as usize;
        let last = track.samples.len().saturating_sub(1);
        let samples = (0..n)
            .map(|i| track.samples[((i as f64 * tempo) as usize).min(last)])
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
        if inputs.iter().any(|p| !p.is_absolute()) {
            return Err(DubError::Media("relative path in concat list".to_string()));
        }
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

    async fn mux(&self, _video: &Path, audio: &Path, output: &Path, _: &CancellationToken) -> Result<()> {
        tokio::fs::copy(audio, output).await?;
        Ok(())
    }

    async fn check_availability(&self, _: &CancellationToken) -> Result<String> {
        Ok("wav-media 1.0".to_string())
    }
}

/// Behaves like a model hearing English speech: an English transcript, an
/// empty Urdu transcript and fixed Pashto translations
pub struct ScriptedTranslator;

#[async_trait]
impl TranslationService for ScriptedTranslator {
    async fn speech_to_text(&self, _: &[f32], _: u32, tgt_lang: &str, _: &CancellationToken) -> Result<String> {
        Ok(match tgt_lang {
            "eng" => ENGLISH_TEXT,
            "urd" => "",
            _ => PASHTO_TEXT,
        }
        .to_string())
    }

    async fn text_to_text(&self, _: &str, _: &str, tgt_lang: &str, _: &CancellationToken) -> Result<String> {
        Ok(if tgt_lang == "eng" { ENGLISH_TEXT } else { PASHTO_TEXT }.to_string())
    }

    async fn health_check(&self, _: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

/// Writes a tone, or silence when `silent` is set
pub struct ToneSynth {
    pub silent: bool,
    pub calls: AtomicUsize,
}

impl ToneSynth {
    pub fn good() -> Self {
        Self {
            silent: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ToneSynth {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        _route: Option<&str>,
        out_wav: &Path,
        _: &CancellationToken,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let secs = (text.chars().count() as f64 * 0.08).clamp(0.5, 8.0);
        let mut track = tone(secs);
        if self.silent {
            track.samples.iter_mut().for_each(|s| *s = 0.0);
        }
        write_wav(out_wav, &track)
    }

    fn supports_routes(&self) -> bool {
        false
    }

    async fn health_check(&self, _: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

pub enum FaceScript {
    Steady,
    NoFace,
    Broken,
}

pub struct ScriptedFaces(pub FaceScript);

#[async_trait]
impl FaceTracker for ScriptedFaces {
    async fn face_track(&self, _: &Path, _: &CancellationToken) -> Result<Vec<FaceObservation>> {
        let face = match self.0 {
            FaceScript::Steady => Some(FaceBox::new(100, 300, 200, 380)),
            FaceScript::NoFace => None,
            FaceScript::Broken => return Err(DubError::Media("detector crashed".to_string())),
        };
        Ok((0..120)
            .map(|i| FaceObservation {
                frame: i * 2,
                faces: face.into_iter().collect(),
            })
            .collect())
    }
}

/// Succeeds by copying the dubbed audio into the output, or always fails.
/// Records whether the staged subtitles existed when it was called.
pub struct ScriptedLipSync {
    pub succeed: bool,
    pub calls: AtomicUsize,
    pub saw_staged_subtitles: AtomicBool,
}

impl ScriptedLipSync {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
            saw_staged_subtitles: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LipSyncService for ScriptedLipSync {
    async fn run(&self, request: &LipSyncRequest, _: &CancellationToken) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(job_dir) = request.output.parent() {
            let staged = job_dir.join("work").join("pashto_translation.srt");
            self.saw_staged_subtitles.store(staged.is_file(), Ordering::SeqCst);
        }
        if !self.succeed {
            tokio::fs::write(&request.output, b"partial").await?;
            return Err(DubError::Inference(format!("{} ran out of memory", request.config.label)));
        }
        tokio::fs::copy(&request.audio, &request.output).await?;
        Ok(())
    }

    async fn health_check(&self, _: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

pub fn services(synth: Arc<ToneSynth>, faces: FaceScript, lipsync: Arc<ScriptedLipSync>) -> Services {
    Services {
        media: Arc::new(WavMedia),
        translator: Arc::new(ScriptedTranslator),
        synthesizer: synth,
        face_tracker: Arc::new(ScriptedFaces(faces)),
        lipsync,
        vad: Arc::new(EnergyVad::default()),
        gender: Arc::new(PitchGenderEstimator::default()),
    }
}

/// The single job directory created under `root`
pub fn only_job_dir(root: &Path) -> PathBuf {
    let dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(dirs.len(), 1, "expected one job directory, found {:?}", dirs);
    dirs.into_iter().next().unwrap()
}

pub fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect()
}
