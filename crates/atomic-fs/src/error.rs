//! Error types for atomic-fs

use std::path::PathBuf;

/// Result type for atomic-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in atomic-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Journal not found at {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid journal at {path}: {reason}")]
    InvalidJournal { path: PathBuf, reason: String },

    #[error("Journal at {path} is locked by another process")]
    Locked { path: PathBuf },

    #[error("Invalid journal entry path: {message}")]
    InvalidPath { message: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_journal(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidJournal {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The OS error code behind this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
