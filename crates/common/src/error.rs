//! Error types shared across Framecast crates.

use std::path::PathBuf;

/// Coarse classification of an [`ExportError`].
///
/// Callers branch on the kind rather than on individual variants: range and
/// codec errors abort a session before any work is done, sink errors only
/// short-circuit the current call, finalize errors are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRange,
    CodecUnsupported,
    SinkUnavailable,
    FinalizeFailed,
    InvalidSettings,
    AudioDecode,
    Encoder,
    Io,
    Other,
}

/// Top-level error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Invalid export range: end ({end}s) must be greater than start ({start}s)")]
    InvalidRange { start: f64, end: f64 },

    #[error("Unsupported {track} codec settings: {message}")]
    CodecUnsupported { track: TrackKind, message: String },

    #[error("Sink unavailable: {message}")]
    SinkUnavailable { message: String },

    #[error("Finalize failed: {message}")]
    FinalizeFailed { message: String },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("Audio decode error: {message}")]
    AudioDecode { message: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which track of the output container an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Result type alias using ExportError.
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    pub fn invalid_range(start: f64, end: f64) -> Self {
        Self::InvalidRange { start, end }
    }

    pub fn codec_unsupported(track: TrackKind, msg: impl Into<String>) -> Self {
        Self::CodecUnsupported {
            track,
            message: msg.into(),
        }
    }

    pub fn sink_unavailable(msg: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            message: msg.into(),
        }
    }

    pub fn finalize_failed(msg: impl Into<String>) -> Self {
        Self::FinalizeFailed {
            message: msg.into(),
        }
    }

    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: msg.into(),
        }
    }

    pub fn audio_decode(msg: impl Into<String>) -> Self {
        Self::AudioDecode {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::CodecUnsupported { .. } => ErrorKind::CodecUnsupported,
            Self::SinkUnavailable { .. } => ErrorKind::SinkUnavailable,
            Self::FinalizeFailed { .. } => ErrorKind::FinalizeFailed,
            Self::InvalidSettings { .. } => ErrorKind::InvalidSettings,
            Self::AudioDecode { .. } => ErrorKind::AudioDecode,
            Self::Encoder { .. } => ErrorKind::Encoder,
            Self::FileNotFound { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this error ends the session outright.
    ///
    /// Sink errors only affect the call that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::SinkUnavailable)
    }
}
