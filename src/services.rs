use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::{EnergyVad, GenderEstimator, PitchGenderEstimator, VoiceActivityDetector};
use crate::config::Config;
use crate::error::Result;
use crate::lipsync::{FaceTracker, LipSyncFactory, LipSyncService};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::translate::{TranslationService, TranslatorFactory};
use crate::tts::{SpeechSynthesizer, SynthesizerFactory};

/// Handles to every external collaborator a job uses. Built once and passed
/// to the workflow, so tests can substitute any of them.
#[derive(Clone)]
pub struct Services {
    pub media: Arc<dyn MediaProcessorTrait>,
    pub translator: Arc<dyn TranslationService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub face_tracker: Arc<dyn FaceTracker>,
    pub lipsync: Arc<dyn LipSyncService>,
    pub vad: Arc<dyn VoiceActivityDetector>,
    pub gender: Arc<dyn GenderEstimator>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let media = MediaProcessorFactory::create_processor(config.media.clone());
        Ok(Self {
            translator: TranslatorFactory::create_service(&config.translate)?,
            synthesizer: SynthesizerFactory::create_synthesizer(&config.tts, media.clone())?,
            face_tracker: LipSyncFactory::create_face_tracker(&config.lipsync),
            lipsync: LipSyncFactory::create_service(&config.lipsync),
            vad: Arc::new(EnergyVad::default()),
            gender: Arc::new(PitchGenderEstimator::default()),
            media,
        })
    }

    /// Check the collaborators before the first job. Media and translation
    /// are required; synthesis and lip-sync problems are only reported since
    /// a later attempt or the dubbed fallback may still succeed.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        let version = self.media.check_availability(cancel).await?;
        info!("Media tool: {}", version);

        self.translator.health_check(cancel).await?;
        info!("Translation service is reachable");

        if let Err(e) = self.synthesizer.health_check(cancel).await {
            if e.is_cancelled() {
                return Err(e);
            }
            warn!("Speech synthesizer check failed: {}", e);
        }
        if let Err(e) = self.lipsync.health_check(cancel).await {
            if e.is_cancelled() {
                return Err(e);
            }
            warn!("Lip-sync unavailable, jobs will export dubbed video: {}", e);
        }
        Ok(())
    }

    /// Release the collaborator handles
    pub fn shutdown(self) {
        info!("Shutting down services");
        drop(self);
    }
}
