// Translation to Pashto
//
// The model runs behind an inference server; this module decides what to ask
// it and which answer to keep:
// - service: HTTP client for speech-to-text and text-to-text requests
// - verify: candidate generation, round-trip scoring and selection
// - similarity: pluggable round-trip scoring functions
// - language: script-ratio source language detection
// - terms: terminology overrides applied to the chosen text

pub mod language;
pub mod service;
pub mod similarity;
pub mod terms;
pub mod verify;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use language::*;
pub use service::*;
pub use similarity::*;
pub use terms::*;
pub use verify::*;

use crate::config::TranslateConfig;
use crate::error::Result;

/// Speech-to-text and text-to-text translation model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Transcribe or translate mono audio into text in `tgt_lang`
    async fn speech_to_text(
        &self,
        samples: &[f32],
        sample_rate: u32,
        tgt_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;

    async fn text_to_text(
        &self,
        text: &str,
        src_lang: &str,
        tgt_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Fails when the service cannot be reached
    async fn health_check(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Factory for creating translation service instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_service(config: &TranslateConfig) -> Result<Arc<dyn TranslationService>> {
        Ok(Arc::new(service::HttpTranslationService::new(config)?))
    }
}
