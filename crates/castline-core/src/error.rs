//! Error types for Castline Core

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    // Engine errors
    #[error("Platform not supported: {reason}")]
    UnsupportedPlatform { reason: String },

    #[error("Failed to load playback engine: {0}")]
    EngineLoad(String),

    #[error("Engine error: {0}")]
    Engine(String),

    // Manifest errors
    #[error("Failed to load {source_name}: {reason}")]
    ManifestLoad { source_name: String, reason: String },

    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid manifest format: {0}")]
    InvalidManifest(String),

    // Session errors
    #[error("Session teardown failed: {0}")]
    Teardown(String),

    #[error("Load superseded by a newer request")]
    Superseded,

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // DRM errors
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Content key not found: {kid}")]
    ContentKeyNotFound { kid: String },

    // Source errors
    #[error("Invalid media source: {0}")]
    InvalidSource(String),

    // Network errors
    #[cfg(feature = "headless")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Error::Engine(msg.into())
    }

    /// Wrap any load-stage failure so it names the source that failed
    pub fn manifest_load(source_name: impl Into<String>, cause: &Error) -> Self {
        Error::ManifestLoad {
            source_name: source_name.into(),
            reason: cause.to_string(),
        }
    }

    /// Returns true if re-issuing the load may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::EngineLoad(_) | Error::ManifestFetch(_) | Error::Teardown(_) => true,
            #[cfg(feature = "headless")]
            Error::Network(_) => true,
            _ => false,
        }
    }

    /// Short message for the error overlay
    pub fn overlay_message(&self, source_name: &str) -> String {
        match self {
            Error::UnsupportedPlatform { .. } => "Browser not supported".to_string(),
            Error::EngineLoad(_) => "Player engine could not be loaded".to_string(),
            _ => format!("Failed to load {}", source_name),
        }
    }

    /// Returns the error code for logs and structured output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnsupportedPlatform { .. } => "UNSUPPORTED_PLATFORM",
            Error::EngineLoad(_) => "ENGINE_LOAD",
            Error::Engine(_) => "ENGINE",
            Error::ManifestLoad { .. } => "MANIFEST_LOAD",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::Teardown(_) => "TEARDOWN",
            Error::Superseded => "SUPERSEDED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidKeyMaterial(_) => "INVALID_KEY",
            Error::ContentKeyNotFound { .. } => "KEY_NOT_FOUND",
            Error::InvalidSource(_) => "INVALID_SOURCE",
            #[cfg(feature = "headless")]
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
        }
    }
}
