//! Merge engine for atomic-install
//!
//! Replaces a destination tree with a source tree in four journaled steps
//! (copy-new, backup-old, replace, cleanup) and can undo any prefix of them.
//! The [`MergeEngine`] control loop reads its next move from the journal
//! flags alone, so any invocation can resume or roll back a transaction a
//! previous process left behind.

pub mod copy;
pub mod engine;
pub mod error;
pub mod layout;
pub mod options;
pub mod report;
mod rollback;
mod steps;

pub use engine::{JournalOrigin, MergeEngine, Outcome, open_journal};
pub use error::{Error, Result};
pub use layout::MergeLayout;
pub use options::MergeOptions;
pub use report::{NullReporter, Phase, Reporter};

pub use atomic_fs::{LockMode, MergeFlags, MergeState, RelPath, Stage};
