// Pashto speech synthesis
//
// - voice: gender-aware voice ranking
// - routes: direct and proxy network routes for the online backend
// - engine: ranked-attempt synthesis with output validation
// - edge / espeak: synthesizer backends

pub mod edge;
pub mod engine;
pub mod espeak;
pub mod routes;
pub mod voice;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use engine::*;
pub use routes::*;
pub use voice::*;

use crate::config::{TtsBackend, TtsConfig};
use crate::error::Result;
use crate::media::MediaProcessorTrait;

/// Text-to-speech backend
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write `text` spoken by `voice` to `out_wav` as pipeline WAV.
    /// `route` is a proxy URL, `None` for a direct connection.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        route: Option<&str>,
        out_wav: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Whether `route` has any effect
    fn supports_routes(&self) -> bool {
        true
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Factory for creating synthesizer instances
pub struct SynthesizerFactory;

impl SynthesizerFactory {
    pub fn create_synthesizer(
        config: &TtsConfig,
        media: Arc<dyn MediaProcessorTrait>,
    ) -> Result<Arc<dyn SpeechSynthesizer>> {
        match config.backend {
            TtsBackend::EdgeTts => Ok(Arc::new(edge::EdgeTtsSynthesizer::new(config, media)?)),
            TtsBackend::Espeak => Ok(Arc::new(espeak::EspeakSynthesizer::new(config, media))),
        }
    }
}
