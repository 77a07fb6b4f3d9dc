use thiserror::Error;

use crate::types::Language;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Engine for {language} is not ready: {reason}")]
    EngineNotReady { language: Language, reason: String },

    #[error("Engine initialization failed: {0}")]
    Initialization(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("System error: {0}")]
    System(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error rejects a request before any engine was touched.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::UnsupportedLanguage(_) | Error::InvalidRequest(_))
    }
}

/// Classification of a logical failure raised by user code.
///
/// Both kinds leave the engine `Ready`. Attempts to reach a denied capability
/// surface as the language's own runtime error and are reported as `Runtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeErrorKind {
    /// Source is malformed for its language (parse or compile stage).
    Compile,
    /// Unhandled error raised while the code was running.
    Runtime,
}
