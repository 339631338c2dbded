use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DubError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub translate: TranslateConfig,
    pub tts: TtsConfig,
    pub align: AlignConfig,
    pub gate: GateConfig,
    pub lipsync: LipSyncConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source language: auto, eng or urd
    pub source_lang: SourceLangMode,
    /// Language used when auto-detection is ambiguous
    pub fallback_source_lang: SourceLanguage,
    /// Target language code understood by the translation service
    pub target_lang: String,
    /// Compute device for model inference
    pub device: DevicePolicy,
    /// Voice gender selection mode
    pub gender_mode: GenderMode,
    /// Chunk length used for translation and synthesis (seconds)
    pub chunk_seconds: f64,
    /// Lower bound applied to `chunk_seconds`
    pub min_chunk_seconds: f64,
    /// Trailing chunks shorter than this are merged into the previous chunk
    pub trailing_merge_seconds: f64,
    /// Round-trip verification of translation candidates
    pub verify_translation: bool,
    /// Directory in which per-job output folders are created
    pub output_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Translation inference server URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Attempts per request, timeouts included
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Minimum score advantage a relay candidate needs over the direct one
    pub verification_margin: f64,
    /// Scores below this are logged as low confidence
    pub min_roundtrip_score: f64,
    /// Round-trip similarity function
    pub similarity: SimilarityMethod,
    /// Optional JSON file with `{"pashto_replace": {...}}`
    pub term_overrides_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    /// Command used to invoke edge-tts, e.g. ["python", "-m", "edge_tts"]
    pub edge_tts_command: Vec<String>,
    pub espeak_command: String,
    /// espeak voice used regardless of gender ranking
    pub espeak_voice: String,
    pub female_voices: Vec<String>,
    pub male_voices: Vec<String>,
    /// Gender preferred when auto mode cannot estimate the speaker
    pub default_gender: Gender,
    /// Total synthesis attempts allowed for a single chunk
    pub max_attempts_per_chunk: u32,
    /// Passes over the voice x route plan
    pub rounds: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub min_duration_secs: f64,
    pub min_seconds_per_char: f64,
    /// Extra proxy routes tried after the direct route
    pub proxies: Vec<String>,
    /// Local ports probed for a running proxy
    pub probe_local_proxy_ports: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub chunk_tolerance_secs: f64,
    pub total_tolerance_secs: f64,
    pub min_chunk_target_secs: f64,
    /// Peak amplitude below which audio counts as silent
    pub silence_peak: f32,
    /// RMS amplitude below which audio counts as silent
    pub silence_rms: f32,
    /// Minimum fraction of active frames in the final track
    pub min_active_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_face_ratio: f64,
    pub min_speech_ratio: f64,
    /// Minimum IoU with the dominant face for a frame to count as tracked
    pub stability_iou: f64,
    pub min_face_size_px: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    pub enabled: bool,
    pub python: String,
    /// Wav2Lip checkout containing inference.py
    pub repo_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    /// Helper printing one JSON face observation per sampled frame
    pub face_tracker_command: Vec<String>,
    pub face_sample_every: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Path to ffprobe binary
    pub probe_path: String,
    pub timeout_secs: u64,
    pub sample_rate: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_lang: SourceLangMode::Auto,
            fallback_source_lang: SourceLanguage::Eng,
            target_lang: "pbt".to_string(),
            device: DevicePolicy::Auto,
            gender_mode: GenderMode::Auto,
            chunk_seconds: 20.0,
            min_chunk_seconds: 4.0,
            trailing_merge_seconds: 1.0,
            verify_translation: true,
            output_root: PathBuf::from("outputs"),
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8765".to_string(),
            timeout_secs: 300,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            verification_margin: 0.03,
            min_roundtrip_score: 0.55,
            similarity: SimilarityMethod::Sequence,
            term_overrides_path: Some(PathBuf::from("configs/term_overrides.json")),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::EdgeTts,
            edge_tts_command: vec!["python".to_string(), "-m".to_string(), "edge_tts".to_string()],
            espeak_command: "espeak-ng".to_string(),
            espeak_voice: "ps".to_string(),
            female_voices: vec!["ps-AF-LatifaNeural".to_string()],
            male_voices: vec!["ps-AF-GulNawazNeural".to_string()],
            default_gender: Gender::Female,
            max_attempts_per_chunk: 12,
            rounds: 4,
            retry_delay_ms: 1_000,
            timeout_secs: 120,
            min_duration_secs: 0.18,
            min_seconds_per_char: 0.02,
            proxies: Vec::new(),
            probe_local_proxy_ports: vec![17890, 7890],
        }
    }
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            chunk_tolerance_secs: 0.35,
            total_tolerance_secs: 0.35,
            min_chunk_target_secs: 0.25,
            silence_peak: 0.003,
            silence_rms: 0.0008,
            min_active_fraction: 0.02,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_face_ratio: 0.95,
            min_speech_ratio: 0.10,
            stability_iou: 0.3,
            min_face_size_px: 48,
        }
    }
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            python: "python".to_string(),
            repo_dir: PathBuf::from("external/Wav2Lip"),
            checkpoint: PathBuf::from("models/wav2lip/checkpoints/wav2lip_gan.pth"),
            max_attempts: 4,
            timeout_secs: 3_600,
            face_tracker_command: vec!["python".to_string(), "scripts/face_track.py".to_string()],
            face_sample_every: 2,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_path: "ffprobe".to_string(),
            timeout_secs: 1_800,
            sample_rate: 16_000,
        }
    }
}

impl TranslateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MediaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| DubError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject values that would make a stage loop forever or never run
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.chunk_seconds <= 0.0 {
            return Err(DubError::Config("pipeline.chunk_seconds must be positive".to_string()));
        }
        if self.translate.max_attempts == 0 {
            return Err(DubError::Config("translate.max_attempts must be at least 1".to_string()));
        }
        if self.tts.max_attempts_per_chunk == 0 || self.tts.rounds == 0 {
            return Err(DubError::Config(
                "tts.max_attempts_per_chunk and tts.rounds must be at least 1".to_string(),
            ));
        }
        if self.tts.female_voices.is_empty() && self.tts.male_voices.is_empty() {
            return Err(DubError::Config("at least one TTS voice must be configured".to_string()));
        }
        if self.lipsync.max_attempts == 0 {
            return Err(DubError::Config("lipsync.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Requested source language handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLangMode {
    Auto,
    Eng,
    Urd,
}

/// A concrete source language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Eng,
    Urd,
}

impl SourceLanguage {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Eng => "eng",
            Self::Urd => "urd",
        }
    }
}

impl SourceLangMode {
    /// The fixed language, if the user selected one
    pub fn fixed(&self) -> Option<SourceLanguage> {
        match self {
            Self::Auto => None,
            Self::Eng => Some(SourceLanguage::Eng),
            Self::Urd => Some(SourceLanguage::Urd),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderMode {
    Auto,
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Male => Self::Female,
            Self::Female => Self::Male,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    Auto,
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsBackend {
    EdgeTts,
    Espeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Matching-block ratio over normalized characters
    Sequence,
    /// Token-level F1
    TokenOverlap,
}

impl FromStr for SourceLangMode {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "eng" | "en" => Ok(Self::Eng),
            "urd" | "ur" => Ok(Self::Urd),
            _ => Err(DubError::Config(format!(
                "Invalid source language '{}'. Valid values: auto, eng, urd",
                s
            ))),
        }
    }
}

impl FromStr for GenderMode {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            _ => Err(DubError::Config(format!(
                "Invalid voice gender '{}'. Valid values: auto, male, female",
                s
            ))),
        }
    }
}

impl FromStr for DevicePolicy {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(DubError::Config(format!(
                "Invalid device '{}'. Valid values: auto, cpu, cuda",
                s
            ))),
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => f.write_str("male"),
            Self::Female => f.write_str("female"),
        }
    }
}

impl fmt::Display for DevicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda => f.write_str("cuda"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.pipeline.target_lang, "pbt");
        assert_eq!(loaded.pipeline.gender_mode, GenderMode::Auto);
        assert_eq!(loaded.tts.backend, TtsBackend::EdgeTts);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[pipeline]\nsource_lang = \"urd\"\n").unwrap();
        assert_eq!(config.pipeline.source_lang, SourceLangMode::Urd);
        assert_eq!(config.pipeline.chunk_seconds, 20.0);
        assert_eq!(config.gate.min_face_ratio, 0.95);
    }

    #[test]
    fn test_mode_parsing_rejects_unknown_values() {
        assert_eq!("Male".parse::<GenderMode>().unwrap(), GenderMode::Male);
        assert_eq!("urd".parse::<SourceLangMode>().unwrap(), SourceLangMode::Urd);
        assert!("robot".parse::<GenderMode>().is_err());
        assert!("fr".parse::<SourceLangMode>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut config = Config::default();
        config.tts.max_attempts_per_chunk = 0;
        assert!(config.validate().is_err());
    }
}
