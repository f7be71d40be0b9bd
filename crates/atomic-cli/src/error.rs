//! Error types for atomic-cli

use atomic_core::MergeState;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that end an `atomic-install` invocation
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from atomic-core
    #[error(transparent)]
    Core(#[from] atomic_core::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A signal stopped the run after one rollback step
    #[error("{}", interrupted_message(.state))]
    Interrupted { state: Option<MergeState> },
}

fn interrupted_message(state: &Option<MergeState>) -> String {
    match state {
        Some(state) => format!("Interrupted ({state}), rerun with --rollback to finish"),
        None => "Interrupted, transaction rolled back".to_string(),
    }
}

impl CliError {
    /// Process exit status: the OS error code behind the failure when it
    /// fits in an exit status, `EINVAL` for a corrupt journal, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        let raw = match self {
            Self::Core(e) if e.is_invalid_journal() => Some(libc::EINVAL),
            Self::Core(e) => e.raw_os_error(),
            Self::Io(e) => e.raw_os_error(),
            Self::Interrupted { .. } => None,
        };
        match raw {
            Some(code) if (1..=255).contains(&code) => code,
            _ => 1,
        }
    }
}
