use thiserror::Error;

/// Main error type for the reel compositor
///
/// Every variant is fatal for the current run. There is no retry and no
/// partial output: a half-transitioned reel is not a meaningful artifact.
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("No clips were supplied")]
    EmptyInput,

    #[error("Failed to load clip {url}: {reason}")]
    ClipLoad { url: String, reason: String },

    #[error("No supported encoding format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("Drawing surface unavailable: {reason}")]
    CompositeSurface { reason: String },

    #[error("Failed to finalize encoded video: {reason}")]
    EncodeFinalization { reason: String },

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path} ({reason})")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using StitchError
pub type Result<T> = std::result::Result<T, StitchError>;

impl StitchError {
    pub fn clip_load<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        Self::ClipLoad {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported<R: Into<String>>(reason: R) -> Self {
        Self::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    pub fn surface<R: Into<String>>(reason: R) -> Self {
        Self::CompositeSurface {
            reason: reason.into(),
        }
    }

    pub fn finalization<R: Into<String>>(reason: R) -> Self {
        Self::EncodeFinalization {
            reason: reason.into(),
        }
    }

    /// Get a user-friendly error message
    ///
    /// This is the text carried by the final `error` progress event.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "Add at least one clip before creating a video.".to_string(),
            Self::ClipLoad { url, .. } => {
                format!(
                    "Could not load clip '{}'. Check that the link is reachable and the video format is supported.",
                    url
                )
            }
            Self::UnsupportedFormat { .. } => {
                "No supported video format is available for encoding on this system.".to_string()
            }
            Self::Cancelled => "Video processing was cancelled.".to_string(),
            _ => self.to_string(),
        }
    }
}
