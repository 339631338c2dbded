// Lip-sync stage
//
// - face: per-frame face observations from an external detector
// - gate: eligibility decision from face continuity and speech activity
// - wav2lip: parameter ladder and the inference service
// - runner: ordered attempts with the dubbed-mux fallback

pub mod face;
pub mod gate;
pub mod runner;
pub mod wav2lip;

use std::sync::Arc;

pub use face::*;
pub use gate::*;
pub use runner::*;
pub use wav2lip::*;

use crate::config::LipSyncConfig;

/// Factory for the lip-sync collaborators
pub struct LipSyncFactory;

impl LipSyncFactory {
    pub fn create_face_tracker(config: &LipSyncConfig) -> Arc<dyn FaceTracker> {
        Arc::new(CommandFaceTracker::new(config))
    }

    pub fn create_service(config: &LipSyncConfig) -> Arc<dyn LipSyncService> {
        Arc::new(Wav2LipService::new(config))
    }
}
