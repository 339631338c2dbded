use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{SpeechSynthesizer, VoiceCandidate};
use crate::audio::{read_wav, AudioTrack};
use crate::config::{AlignConfig, TtsConfig};
use crate::error::{DubError, Result};
use crate::retry::sleep_or_cancel;
use crate::translate::TranslatedChunk;

/// One (round, voice, route) combination to try
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAttempt {
    pub round: u32,
    pub voice: VoiceCandidate,
    pub route: Option<String>,
}

/// Outcome of one synthesis call
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisAttempt {
    pub chunk_index: usize,
    pub voice_id: String,
    pub route: Option<String>,
    pub round: u32,
    pub accepted: bool,
    pub verdict: String,
}

/// Accepted audio for one chunk
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedChunk {
    pub index: usize,
    pub path: PathBuf,
    pub voice_id: String,
    pub duration_secs: f64,
    pub attempts: Vec<SynthesisAttempt>,
}

/// Rounds over voices over routes, truncated to `budget` entries
pub fn plan_attempts(
    voices: &[VoiceCandidate],
    routes: &[Option<String>],
    rounds: u32,
    budget: u32,
) -> Vec<PlannedAttempt> {
    let direct_only = [None];
    let routes = if routes.is_empty() { &direct_only[..] } else { routes };
    (0..rounds.max(1))
        .flat_map(move |round| {
            voices.iter().flat_map(move |voice| {
                routes.iter().map(move |route| PlannedAttempt {
                    round,
                    voice: voice.clone(),
                    route: route.clone(),
                })
            })
        })
        .take(budget as usize)
        .collect()
}

/// Minimum duration and non-silence checks on synthesized audio
#[derive(Debug, Clone)]
pub struct SynthesisValidator {
    pub min_duration_secs: f64,
    pub min_seconds_per_char: f64,
    pub silence_peak: f32,
    pub silence_rms: f32,
}

impl SynthesisValidator {
    pub fn from_config(tts: &TtsConfig, align: &AlignConfig) -> Self {
        Self {
            min_duration_secs: tts.min_duration_secs,
            min_seconds_per_char: tts.min_seconds_per_char,
            silence_peak: align.silence_peak,
            silence_rms: align.silence_rms,
        }
    }

    /// Shortest acceptable audio for `text`
    pub fn expected_min_duration(&self, text: &str) -> f64 {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        self.min_duration_secs.max(chars as f64 * self.min_seconds_per_char)
    }

    pub fn validate(&self, text: &str, track: &AudioTrack) -> Result<()> {
        let duration = track.duration_secs();
        let expected = self.expected_min_duration(text);
        if duration < expected {
            return Err(DubError::Validation(format!(
                "synthesized audio too short ({:.2}s < {:.2}s)",
                duration, expected
            )));
        }
        if track.levels().is_near_silent(self.silence_peak, self.silence_rms) {
            return Err(DubError::Validation("synthesized audio is near-silent".to_string()));
        }
        Ok(())
    }
}

/// Runs synthesis per chunk over a ranked attempt plan until one output
/// validates
pub struct SynthesisRetryEngine {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    validator: SynthesisValidator,
    rounds: u32,
    max_attempts: u32,
    retry_delay: Duration,
}

impl SynthesisRetryEngine {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, tts: &TtsConfig, align: &AlignConfig) -> Self {
        Self {
            synthesizer,
            validator: SynthesisValidator::from_config(tts, align),
            rounds: tts.rounds,
            max_attempts: tts.max_attempts_per_chunk,
            retry_delay: Duration::from_millis(tts.retry_delay_ms),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Wait after a failure in the given 0-based round
    fn backoff(&self, round: u32) -> Duration {
        self.retry_delay.mul_f64(1.0 + 0.7 * round as f64)
    }

    /// Synthesize one chunk into `work_dir`. Exhausting the plan is a
    /// [`DubError::Validation`] naming the chunk and the last failure.
    pub async fn synthesize_chunk(
        &self,
        chunk: &TranslatedChunk,
        voices: &[VoiceCandidate],
        routes: &[Option<String>],
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedChunk> {
        let text = chunk.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(DubError::Validation(format!("chunk {} has no text to synthesize", chunk.index + 1)));
        }
        if voices.is_empty() {
            return Err(DubError::Validation(format!("chunk {}: no voice candidates", chunk.index + 1)));
        }

        let routes: Vec<Option<String>> = if self.synthesizer.supports_routes() {
            routes.to_vec()
        } else {
            vec![None]
        };
        let plan = plan_attempts(voices, &routes, self.rounds, self.max_attempts);
        let out_path = std::path::absolute(work_dir.join(format!("tts_raw_{:04}.wav", chunk.index + 1)))?;

        let mut attempts = Vec::with_capacity(plan.len());
        let mut last_error = String::from("no attempts were made");

        for (n, planned) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DubError::Cancelled(format!("synthesis of chunk {} cancelled", chunk.index + 1)));
            }
            if out_path.exists() {
                tokio::fs::remove_file(&out_path).await?;
            }

            let outcome = self.try_once(&text, planned, &out_path, cancel).await;
            match outcome {
                Ok(track) => {
                    attempts.push(SynthesisAttempt {
                        chunk_index: chunk.index,
                        voice_id: planned.voice.voice_id.clone(),
                        route: planned.route.clone(),
                        round: planned.round,
                        accepted: true,
                        verdict: "ok".to_string(),
                    });
                    info!(
                        "Chunk {}: synthesized {:.2}s with {} (attempt {}/{})",
                        chunk.index + 1,
                        track.duration_secs(),
                        planned.voice.voice_id,
                        n + 1,
                        plan.len()
                    );
                    return Ok(SynthesizedChunk {
                        index: chunk.index,
                        path: out_path,
                        voice_id: planned.voice.voice_id.clone(),
                        duration_secs: track.duration_secs(),
                        attempts,
                    });
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(
                        "TTS retry {}/{} failed (voice={}, round={}, proxy={}): {}",
                        n + 1,
                        plan.len(),
                        planned.voice.voice_id,
                        planned.round + 1,
                        planned.route.as_deref().unwrap_or("none"),
                        e
                    );
                    last_error = e.to_string();
                    attempts.push(SynthesisAttempt {
                        chunk_index: chunk.index,
                        voice_id: planned.voice.voice_id.clone(),
                        route: planned.route.clone(),
                        round: planned.round,
                        accepted: false,
                        verdict: last_error.clone(),
                    });
                    if n + 1 < plan.len() {
                        sleep_or_cancel(self.backoff(planned.round), cancel).await?;
                    }
                }
            }
        }

        Err(DubError::Validation(format!(
            "chunk {}: speech synthesis failed for all {} attempts across {} voices, last error: {}",
            chunk.index + 1,
            attempts.len(),
            voices.len(),
            last_error
        )))
    }

    async fn try_once(
        &self,
        text: &str,
        planned: &PlannedAttempt,
        out_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<AudioTrack> {
        self.synthesizer
            .synthesize(text, &planned.voice.voice_id, planned.route.as_deref(), out_path, cancel)
            .await?;
        if !out_path.exists() {
            return Err(DubError::Validation("synthesizer produced no output file".to_string()));
        }
        let track = read_wav(out_path)?;
        self.validator.validate(text, &track)?;
        Ok(track)
    }

    /// Synthesize every chunk in order; the first exhausted chunk fails the
    /// whole set
    pub async fn synthesize_all(
        &self,
        chunks: &[TranslatedChunk],
        voices: &[VoiceCandidate],
        routes: &[Option<String>],
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<SynthesizedChunk>> {
        let mut out = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            info!("TTS chunk {}/{}", chunk.index + 1, chunks.len());
            out.push(self.synthesize_chunk(chunk, voices, routes, work_dir, cancel).await?);
        }
        Ok(out)
    }
}
