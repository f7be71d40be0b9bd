//! Runtime configuration of a merge run

use atomic_fs::LockMode;

/// How a single invocation should drive the transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Roll the existing transaction back instead of moving it forward.
    pub rollback: bool,
    /// Stop once everything is ready for replacement.
    pub no_replace: bool,
    /// Take a single decision, then return.
    pub one_step: bool,
    /// Never create a journal; only continue an existing one.
    pub resume: bool,
    /// Report every entry, not just every phase.
    pub verbose: bool,
    /// Behaviour when another process holds the journal.
    pub lock: LockMode,
}
