//! Error types for tube-autoplay

use thiserror::Error;

/// Coarse failure classes the playback core reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Video removed or unavailable. Terminal, never retried.
    NotFound,
    /// Transient transport failure.
    Network,
    /// Malformed or unexpected response.
    Protocol,
    /// The underlying player resource is gone.
    Player,
}

/// Error codes for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Network errors
    NetworkError,
    NotFound,
    ProtocolError,

    // Playback errors
    PlayerFailure,

    // Dependency errors
    MissingDependency,

    // User errors
    InvalidConfig,

    // System errors
    FileError,
    SpawnError,
}

/// Main error type for tube-autoplay
#[derive(Error, Debug)]
pub enum TubeError {
    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Player failure: {0}")]
    Player(String),

    #[error("Missing dependency: {0}. Please install it.")]
    MissingDependency(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TubeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Network(_) | Self::Http(_) => ErrorCode::NetworkError,
            Self::Protocol(_) | Self::Json(_) => ErrorCode::ProtocolError,
            Self::Player(_) => ErrorCode::PlayerFailure,
            Self::MissingDependency(_) => ErrorCode::MissingDependency,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::File(_) => ErrorCode::FileError,
            Self::Spawn(_) => ErrorCode::SpawnError,
        }
    }

    /// Collapse into the taxonomy the session acts on.
    ///
    /// Local I/O and configuration problems surface as `Network` so that a
    /// fresh load remains the recovery path; only a dead player is fatal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Protocol(_) | Self::Json(_) => ErrorKind::Protocol,
            Self::Player(_) | Self::MissingDependency(_) | Self::Spawn(_) => ErrorKind::Player,
            Self::Network(_)
            | Self::Http(_)
            | Self::File(_)
            | Self::InvalidConfig(_) => ErrorKind::Network,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Player
    }
}

impl ErrorKind {
    /// Protocol failures are handled exactly like network failures by the session.
    pub fn for_session(self) -> ErrorKind {
        match self {
            ErrorKind::Protocol => ErrorKind::Network,
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, TubeError>;
