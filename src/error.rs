//! Error types for the avatar conversation core.

/// Top-level error type for the avatar system.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Avatar asset could not be fetched or decoded.
    #[error("asset error: {0}")]
    Asset(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Text-generation request failed or returned an unusable payload.
    #[error("response error: {0}")]
    Response(String),

    /// Speech capture or playback error.
    #[error("speech error: {0}")]
    Speech(String),

    /// The platform lacks a required capability (e.g. speech recognition).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AvatarError>;
