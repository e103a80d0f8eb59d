//! Error types shared by the marshalling layer and the runtime.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for tfmodel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of `load` or `execute`.
///
/// Engine-origin variants carry the engine's status text verbatim.
#[derive(Error, Debug)]
pub enum Error {
    /// The model file could not be opened or read.
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// The engine rejected the serialized graph.
    #[error("load graph failed! Error: {0}")]
    GraphImport(String),

    /// The engine rejected the encoded session configuration.
    #[error("session config rejected! Error: {0}")]
    Config(String),

    /// The engine could not create a session for the imported graph.
    #[error("TF_NewSession failed! Error: {0}")]
    SessionCreate(String),

    /// Malformed or mismatched request data, detected before dispatch.
    #[error("invalid input: {0}")]
    InputFormat(String),

    /// The engine run call returned a non-OK status.
    #[error("TF_SessionRun failed! Error: {0}")]
    EngineRun(String),

    /// Operation invoked in a session state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A background unit of work panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    Worker(String),
}

/// Coarse classification of [`Error`], for hosts that map errors onto their
/// own exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::FileNotFound`].
    FileNotFound,
    /// See [`Error::GraphImport`].
    GraphImport,
    /// See [`Error::Config`].
    Config,
    /// See [`Error::SessionCreate`].
    SessionCreate,
    /// See [`Error::InputFormat`].
    InputFormat,
    /// See [`Error::EngineRun`].
    EngineRun,
    /// See [`Error::InvalidState`].
    InvalidState,
    /// See [`Error::Worker`].
    Worker,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileNotFound { .. } => ErrorKind::FileNotFound,
            Error::GraphImport(_) => ErrorKind::GraphImport,
            Error::Config(_) => ErrorKind::Config,
            Error::SessionCreate(_) => ErrorKind::SessionCreate,
            Error::InputFormat(_) => ErrorKind::InputFormat,
            Error::EngineRun(_) => ErrorKind::EngineRun,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Worker(_) => ErrorKind::Worker,
        }
    }

    /// Shorthand for an [`Error::InputFormat`] with a formatted message.
    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Error::InputFormat(msg.into())
    }
}
