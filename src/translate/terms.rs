use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Text used when a chunk translates to nothing
pub const UNTRANSLATED_PLACEHOLDER: &str = "[Untranslated chunk]";

#[derive(Debug, Default, Deserialize)]
struct TermOverrideFile {
    #[serde(default)]
    pashto_replace: BTreeMap<String, String>,
}

/// Literal substring replacements applied to chosen Pashto text
#[derive(Debug, Clone, Default)]
pub struct TermOverrides {
    replacements: BTreeMap<String, String>,
}

impl TermOverrides {
    pub fn new(replacements: BTreeMap<String, String>) -> Self {
        let replacements = replacements
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        Self { replacements }
    }

    /// Load `{"pashto_replace": {...}}`. A missing or unreadable file yields
    /// no overrides.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<TermOverrideFile>(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(file) => {
                let overrides = Self::new(file.pashto_replace);
                if !overrides.is_empty() {
                    info!("Loaded {} terminology replacements from {}", overrides.len(), path.display());
                }
                overrides
            }
            Err(e) => {
                warn!("Could not load term override file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Apply replacements, then substitute the placeholder for empty text
    pub fn apply(&self, text: &str) -> String {
        let mut fixed = text.trim().to_string();
        for (wrong, correct) in &self.replacements {
            fixed = fixed.replace(wrong.as_str(), correct);
        }
        let fixed = fixed.trim();
        if fixed.is_empty() {
            UNTRANSLATED_PLACEHOLDER.to_string()
        } else {
            fixed.to_string()
        }
    }
}
