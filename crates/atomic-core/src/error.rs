//! Error types for atomic-core

use std::path::PathBuf;

/// Result type for atomic-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while merging or rolling back
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on a source, staging, backup or destination path
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Replacement already happened; the old tree is gone
    #[error("Replacement complete, rollback impossible")]
    RollbackImpossible,

    /// Source entry is neither a regular file nor a symbolic link
    #[error("Unsupported file type at {path}")]
    UnsupportedFileType { path: PathBuf },

    /// Neither the staged copy nor the replaced entry exists
    #[error("Staged copy of {entry} is missing and {dest} does not exist")]
    MissingStaged { entry: String, dest: PathBuf },

    /// No journal found and this invocation may not create one
    #[error("No journal at {path} to {action}")]
    NothingToResume { path: PathBuf, action: &'static str },

    /// The engine already deleted its journal
    #[error("Transaction already finished")]
    Finished,

    /// A forward step failed and the transaction was rolled back
    #[error("Merge failed and was rolled back: {source}")]
    RolledBackAfterFailure {
        #[source]
        source: Box<Error>,
    },

    /// Journal store error from atomic-fs
    #[error(transparent)]
    Fs(#[from] atomic_fs::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The OS error code at the root of this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            Self::Fs(inner) => inner.raw_os_error(),
            Self::RolledBackAfterFailure { source } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Whether a journal was found but failed validation.
    pub fn is_invalid_journal(&self) -> bool {
        match self {
            Self::Fs(atomic_fs::Error::InvalidJournal { .. }) => true,
            Self::RolledBackAfterFailure { source } => source.is_invalid_journal(),
            _ => false,
        }
    }
}
