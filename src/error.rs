use thiserror::Error;

#[derive(Error, Debug)]
pub enum DubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Bad or empty source media. Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A network or service call failed or timed out. Retryable within budget.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Synthesized output failed quality checks.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Final dubbed track failed duration or non-silence checks.
    #[error("Audio alignment error: {0}")]
    Alignment(String),

    /// Lip-sync model failure.
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl DubError {
    /// Whether the failure may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Stable label used in job logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Http(_) => "transport",
            Self::Wav(_) => "wav",
            Self::InvalidInput(_) => "invalid_input",
            Self::Transport(_) => "transport",
            Self::Validation(_) => "validation",
            Self::Alignment(_) => "alignment",
            Self::Inference(_) => "inference",
            Self::Media(_) => "media",
            Self::Config(_) => "config",
            Self::FileNotFound(_) => "file_not_found",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, DubError>;
