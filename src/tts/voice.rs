use serde::Serialize;

use crate::config::{Gender, GenderMode, TtsConfig};

/// A ranked Pashto voice identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceCandidate {
    pub voice_id: String,
    pub gender: Gender,
    /// 0 is tried first
    pub rank: usize,
}

/// Orders configured voices by the gender that should speak the dub
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    female_voices: Vec<String>,
    male_voices: Vec<String>,
    default_gender: Gender,
}

impl VoiceSelector {
    pub fn new(female_voices: Vec<String>, male_voices: Vec<String>, default_gender: Gender) -> Self {
        Self {
            female_voices,
            male_voices,
            default_gender,
        }
    }

    pub fn from_config(config: &TtsConfig) -> Self {
        Self::new(
            config.female_voices.clone(),
            config.male_voices.clone(),
            config.default_gender,
        )
    }

    /// Explicit modes override the estimate; auto trusts it when present
    pub fn primary_gender(&self, mode: GenderMode, estimated: Option<Gender>) -> Gender {
        match mode {
            GenderMode::Male => Gender::Male,
            GenderMode::Female => Gender::Female,
            GenderMode::Auto => estimated.unwrap_or(self.default_gender),
        }
    }

    fn voices_for(&self, gender: Gender) -> &[String] {
        match gender {
            Gender::Male => &self.male_voices,
            Gender::Female => &self.female_voices,
        }
    }

    /// Primary gender's voices first, then the other gender's as fallback.
    /// A voice listed twice keeps its first position.
    pub fn rank(&self, mode: GenderMode, estimated: Option<Gender>) -> Vec<VoiceCandidate> {
        let primary = self.primary_gender(mode, estimated);
        let mut ranked: Vec<VoiceCandidate> = Vec::new();
        for gender in [primary, primary.opposite()] {
            for voice in self.voices_for(gender) {
                let voice = voice.trim();
                if voice.is_empty() || ranked.iter().any(|c| c.voice_id == voice) {
                    continue;
                }
                ranked.push(VoiceCandidate {
                    voice_id: voice.to_string(),
                    gender,
                    rank: ranked.len(),
                });
            }
        }
        ranked
    }
}
