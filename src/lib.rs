//! pashto-dub - Automated Pashto dubbing workflow
//!
//! Turns English or Urdu speech in a video into Pashto: chunked speech
//! translation with round-trip verification, gender-aware speech synthesis,
//! duration alignment, and lip-sync with a plain dubbed-video fallback.

pub mod align;
pub mod audio;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod lipsync;
pub mod media;
pub mod process;
pub mod retry;
pub mod services;
pub mod subtitle;
pub mod translate;
pub mod tts;
pub mod workflow;
