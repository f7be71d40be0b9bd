//! Progress reporting seam between the engine and its front end

use std::fmt;

use atomic_fs::RelPath;

use crate::{Error, Outcome};

/// A unit of work the engine announces before starting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    CopyNew,
    BackupOld,
    Replace,
    Cleanup,
    UndoReplace,
    UndoBackup,
    UndoCopy,
}

impl Phase {
    pub fn description(self) -> &'static str {
        match self {
            Self::CopyNew => "Copying new files",
            Self::BackupOld => "Backing up existing files",
            Self::Replace => "Replacing files",
            Self::Cleanup => "Post-merge clean up",
            Self::UndoReplace => "Rolling back replacement",
            Self::UndoBackup => "Rolling back old backup",
            Self::UndoCopy => "Rolling back new copying",
        }
    }

    pub fn is_rollback(self) -> bool {
        matches!(self, Self::UndoReplace | Self::UndoBackup | Self::UndoCopy)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Receives progress from [`crate::MergeEngine`].
///
/// All methods default to doing nothing.
pub trait Reporter {
    fn phase_started(&mut self, _phase: Phase) {}

    fn phase_failed(&mut self, _phase: Phase, _error: &Error) {}

    /// Called per entry, only when verbose reporting is enabled.
    fn entry(&mut self, _phase: Phase, _entry: &RelPath) {}

    fn rollback_impossible(&mut self) {}

    fn finished(&mut self, _outcome: &Outcome) {}
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {}
