//! Error types for digestcast

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for digestcast operations
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gmail API error: {0}")]
    Gmail(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("OpenAI API error ({status}): {message}")]
    OpenAi { status: u16, message: String },

    #[error("Failed to parse email content: {0}")]
    Parse(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    #[error("Audio processing failed: {0}")]
    Audio(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for digestcast operations
pub type Result<T> = std::result::Result<T, DigestError>;

impl DigestError {
    /// Create a new Gmail API error
    pub fn gmail(msg: impl Into<String>) -> Self {
        Self::Gmail(msg.into())
    }

    /// Create a new OAuth error
    pub fn oauth(msg: impl Into<String>) -> Self {
        Self::OAuth(msg.into())
    }

    /// Create a new audio processing error
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a file not found error
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Whether the error comes from outside the known workflow failures
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_) | Self::Regex(_) | Self::Other(_))
    }

    /// Short name of the error category, used in failure notifications
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::FileNotFound { .. } => "IoError",
            Self::Gmail(_) => "GmailError",
            Self::OAuth(_) => "OAuthError",
            Self::OpenAi { .. } => "OpenAiError",
            Self::Parse(_) | Self::Base64(_) => "ParseError",
            Self::Summarization(_) => "SummarizationError",
            Self::Speech(_) => "SpeechError",
            Self::Audio(_) => "AudioError",
            Self::Storage(_) => "StorageError",
            Self::Config(_) | Self::Toml(_) => "ConfigError",
            Self::Serialization(_) => "SerializationError",
            Self::Regex(_) => "RegexError",
            Self::Http(_) => "HttpError",
            Self::Other(_) => "Error",
        }
    }
}
