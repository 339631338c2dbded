use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, DevicePolicy, GenderMode, SourceLangMode};
use crate::error::Result;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hide the per-job progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the `[pipeline]` section shared by `process` and `batch`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PipelineOverrides {
    /// Root directory for job output folders
    #[arg(short, long)]
    pub output_root: Option<PathBuf>,

    /// Compute device for lip-sync (auto, cpu, cuda)
    #[arg(long)]
    pub device: Option<String>,

    /// Source language (auto, eng, urd)
    #[arg(long)]
    pub source_lang: Option<String>,

    /// Target language code passed to the translation service
    #[arg(long)]
    pub target_lang: Option<String>,

    /// Chunk duration in seconds
    #[arg(long)]
    pub chunk_seconds: Option<f64>,

    /// Voice gender (auto, male, female)
    #[arg(long)]
    pub voice_gender: Option<String>,

    /// Skip round-trip translation verification
    #[arg(long)]
    pub no_verify: bool,

    /// Always export the dubbed video without lip-sync
    #[arg(long)]
    pub no_lipsync: bool,
}

impl PipelineOverrides {
    /// Apply the flags that were given on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        let pipeline = &mut config.pipeline;
        if let Some(root) = &self.output_root {
            pipeline.output_root = root.clone();
        }
        if let Some(device) = &self.device {
            pipeline.device = device.parse::<DevicePolicy>()?;
        }
        if let Some(lang) = &self.source_lang {
            pipeline.source_lang = lang.parse::<SourceLangMode>()?;
        }
        if let Some(lang) = &self.target_lang {
            pipeline.target_lang = lang.clone();
        }
        if let Some(secs) = self.chunk_seconds {
            pipeline.chunk_seconds = secs;
        }
        if let Some(gender) = &self.voice_gender {
            pipeline.gender_mode = gender.parse::<GenderMode>()?;
        }
        if self.no_verify {
            pipeline.verify_translation = false;
        }
        if self.no_lipsync {
            config.lipsync.enabled = false;
        }
        config.validate()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a single video into Pashto
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        overrides: PipelineOverrides,
    },

    /// Dub every video file in a directory
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        #[command(flatten)]
        overrides: PipelineOverrides,
    },

    /// Extract the mono pipeline audio from a video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Report lip-sync eligibility of a video against an audio track
    Gate {
        /// Input video file
        #[arg(short, long)]
        video: PathBuf,

        /// Dubbed audio track (WAV)
        #[arg(short, long)]
        audio: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_flags_parse() {
        let args = Args::try_parse_from([
            "pashto-dub",
            "process",
            "--input",
            "talk.mp4",
            "--source-lang",
            "urd",
            "--voice-gender",
            "male",
            "--no-verify",
        ])
        .unwrap();

        match args.command {
            Commands::Process { input, overrides } => {
                assert_eq!(input, PathBuf::from("talk.mp4"));
                assert_eq!(overrides.source_lang.as_deref(), Some("urd"));
                assert_eq!(overrides.voice_gender.as_deref(), Some("male"));
                assert!(overrides.no_verify);
                assert!(overrides.chunk_seconds.is_none());
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let overrides = PipelineOverrides {
            device: Some("cpu".to_string()),
            source_lang: Some("eng".to_string()),
            chunk_seconds: Some(12.0),
            no_lipsync: true,
            ..Default::default()
        };
        let mut config = Config::default();
        overrides.apply(&mut config).unwrap();

        assert_eq!(config.pipeline.device, DevicePolicy::Cpu);
        assert_eq!(config.pipeline.source_lang, SourceLangMode::Eng);
        assert_eq!(config.pipeline.chunk_seconds, 12.0);
        assert!(!config.lipsync.enabled);
        assert!(config.pipeline.verify_translation);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let overrides = PipelineOverrides {
            voice_gender: Some("robot".to_string()),
            ..Default::default()
        };
        assert!(overrides.apply(&mut Config::default()).is_err());
    }
}
