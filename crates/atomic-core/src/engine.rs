//! Control loop driving a merge transaction
//!
//! Every decision is taken from the flags stored in the journal, never from
//! in-memory history, so a fresh process picks up exactly where a crashed
//! one stopped. Milestone flags are written only after the step they record
//! has fully reached disk.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use atomic_fs::{Journal, MergeFlags, MergeState, Stage};

use crate::steps::{self, StepContext};
use crate::{Error, MergeLayout, MergeOptions, Phase, Reporter, Result, rollback};

/// How a call to [`MergeEngine::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New tree in place, backups removed, journal deleted.
    Installed,
    /// Pre-install tree restored, journal deleted.
    RolledBack,
    /// Stopped early on request; the journal describes where to resume.
    Paused(MergeState),
    /// Stopped after an interruption; `None` if the rollback it forced
    /// finished and the journal is gone.
    Interrupted(Option<MergeState>),
}

/// Whether [`open_journal`] found an existing transaction or began one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOrigin {
    Existing,
    Created,
}

/// Open the journal at `journal_path`, creating it from `source` when none
/// exists and `options` allow starting a new transaction.
pub fn open_journal(
    journal_path: &Path,
    source: &Path,
    options: &MergeOptions,
) -> Result<(Journal, JournalOrigin)> {
    match Journal::open(journal_path, options.lock) {
        Ok(journal) => Ok((journal, JournalOrigin::Existing)),
        Err(atomic_fs::Error::NotFound { path }) => {
            if options.rollback || options.resume {
                return Err(Error::NothingToResume {
                    path,
                    action: if options.rollback { "roll back" } else { "resume" },
                });
            }
            tracing::info!(journal = %journal_path.display(), "journal not found, creating");
            Journal::create(journal_path, source)?;
            let journal = Journal::open(journal_path, options.lock)?;
            Ok((journal, JournalOrigin::Created))
        }
        Err(e) => Err(e.into()),
    }
}

enum Step {
    Continue,
    Done(Outcome),
}

/// Owns everything one invocation needs to move a transaction along.
pub struct MergeEngine<'r> {
    journal: Option<Journal>,
    layout: MergeLayout,
    options: MergeOptions,
    reporter: &'r mut dyn Reporter,
    interrupt: Arc<AtomicBool>,
    rollback: bool,
    one_step: bool,
    interrupted: bool,
    failure: Option<Error>,
}

impl<'r> MergeEngine<'r> {
    pub fn new(
        journal: Journal,
        layout: MergeLayout,
        options: MergeOptions,
        reporter: &'r mut dyn Reporter,
    ) -> Self {
        Self {
            journal: Some(journal),
            layout,
            rollback: options.rollback,
            one_step: options.one_step,
            options,
            reporter,
            interrupt: Arc::new(AtomicBool::new(false)),
            interrupted: false,
            failure: None,
        }
    }

    /// Share an interruption flag, typically set from a signal handler.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Current state, or `None` once the journal has been deleted.
    pub fn state(&self) -> Option<MergeState> {
        self.journal
            .as_ref()
            .map(|journal| MergeState::from_flags(journal.flags()))
    }

    pub fn flags(&self) -> Option<MergeFlags> {
        self.journal.as_ref().map(Journal::flags)
    }

    /// Drive the transaction until it finishes, halts, or one step is taken
    /// in one-step mode. The journal is closed (or deleted) on return.
    pub fn run(mut self) -> Result<Outcome> {
        let result = self.drive();
        if let Some(journal) = self.journal.take() {
            if let Err(e) = journal.close() {
                tracing::warn!(error = %e, "journal close failed");
                if result.is_ok() {
                    return Err(e.into());
                }
            }
        }
        if let Ok(outcome) = &result {
            self.reporter.finished(outcome);
        }
        result
    }

    fn drive(&mut self) -> Result<Outcome> {
        loop {
            if !self.interrupted && self.interrupt.load(Ordering::SeqCst) {
                tracing::warn!("interrupted, taking one rollback step");
                self.interrupted = true;
                self.rollback = true;
                self.one_step = true;
            }

            let step = match self.step() {
                Ok(step) => step,
                Err(e) => {
                    if let Some(failure) = self.failure.take() {
                        tracing::error!(error = %failure, "forward step failure preceded this one");
                    }
                    return Err(e);
                }
            };

            match step {
                Step::Continue => {}
                Step::Done(outcome) if self.interrupted => {
                    return Ok(match outcome {
                        Outcome::Installed | Outcome::RolledBack => Outcome::Interrupted(None),
                        other => other,
                    });
                }
                Step::Done(Outcome::RolledBack) => {
                    return match self.failure.take() {
                        Some(failure) => Err(Error::RolledBackAfterFailure {
                            source: Box::new(failure),
                        }),
                        None => Ok(Outcome::RolledBack),
                    };
                }
                Step::Done(outcome) => return Ok(outcome),
            }

            if self.one_step {
                if let Some(failure) = self.failure.take() {
                    return Err(failure);
                }
                let state = self.state();
                return Ok(if self.interrupted {
                    Outcome::Interrupted(state)
                } else {
                    Outcome::Paused(state.unwrap_or(MergeState::Fresh))
                });
            }
        }
    }

    /// Take exactly one decision of the state machine.
    fn step(&mut self) -> Result<Step> {
        let flags = self.journal.as_ref().ok_or(Error::Finished)?.flags();

        if self.rollback || flags.contains(MergeFlags::ROLLBACK_STARTED) {
            return self.rollback_step(flags);
        }

        match MergeState::from_flags(flags) {
            MergeState::Replaced => {
                self.forward(Phase::Cleanup, Stage::Cleanup, None, |ctx, files| {
                    steps::cleanup(ctx, files)
                })?;
                self.finish(Outcome::Installed)
            }
            MergeState::BackedOldUp => {
                if self.options.no_replace {
                    tracing::info!("stopping before replacement as requested");
                    return Ok(Step::Done(Outcome::Paused(MergeState::BackedOldUp)));
                }
                if let Err(e) = self.forward(
                    Phase::Replace,
                    Stage::Replace,
                    Some(MergeFlags::REPLACED),
                    |ctx, files| steps::replace(ctx, files),
                ) {
                    tracing::error!(error = %e, "replacement failed, switching to rollback");
                    let journal = self.journal_mut()?;
                    let flags = journal.flags() | MergeFlags::ROLLBACK_STARTED;
                    journal.set_flags(flags)?;
                    self.rollback = true;
                    self.failure = Some(e);
                }
                Ok(Step::Continue)
            }
            MergeState::CopiedNew => {
                self.forward(
                    Phase::BackupOld,
                    Stage::BackupOld,
                    Some(MergeFlags::BACKED_OLD_UP),
                    |ctx, files| steps::backup_old(ctx, files),
                )?;
                Ok(Step::Continue)
            }
            MergeState::Fresh => {
                self.forward(
                    Phase::CopyNew,
                    Stage::CopyNew,
                    Some(MergeFlags::COPIED_NEW),
                    |ctx, files| steps::copy_new(ctx, files),
                )?;
                Ok(Step::Continue)
            }
            MergeState::RollingBack => self.rollback_step(flags),
        }
    }

    fn rollback_step(&mut self, flags: MergeFlags) -> Result<Step> {
        if flags.contains(MergeFlags::REPLACED) {
            tracing::error!("replacement complete, rollback impossible");
            self.reporter.rollback_impossible();
            return Err(Error::RollbackImpossible);
        }

        if !flags.contains(MergeFlags::ROLLBACK_STARTED) {
            self.journal_mut()?
                .set_flags(flags | MergeFlags::ROLLBACK_STARTED)?;
        }

        if flags.contains(MergeFlags::BACKED_OLD_UP) {
            self.undo(Phase::UndoReplace, |ctx, files| rollback::undo_replace(ctx, files))?;
            let journal = self.journal_mut()?;
            let cleared = journal.flags().difference(MergeFlags::BACKED_OLD_UP);
            journal.set_flags(cleared)?;
            return Ok(Step::Continue);
        }

        self.undo(Phase::UndoBackup, |ctx, files| rollback::undo_backup(ctx, files))?;
        self.undo(Phase::UndoCopy, |ctx, files| rollback::undo_copy(ctx, files))?;
        self.finish(Outcome::RolledBack)
    }

    /// Run a forward step: persist the stage, do the work, persist the flag.
    fn forward<F>(
        &mut self,
        phase: Phase,
        stage: Stage,
        milestone: Option<MergeFlags>,
        run: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut StepContext<'_>, atomic_fs::FileList<'_>) -> Result<()>,
    {
        self.journal_mut()?.set_stage(stage)?;
        tracing::info!(%phase, "starting");
        self.reporter.phase_started(phase);

        let journal = self.journal.as_ref().ok_or(Error::Finished)?;
        let mut ctx = StepContext {
            layout: &self.layout,
            reporter: &mut *self.reporter,
            verbose: self.options.verbose,
        };
        if let Err(e) = run(&mut ctx, journal.files()) {
            self.reporter.phase_failed(phase, &e);
            return Err(e);
        }

        if let Some(milestone) = milestone {
            let journal = self.journal_mut()?;
            let flags = journal.flags() | milestone;
            journal.set_flags(flags)?;
        }
        Ok(())
    }

    fn undo<F>(&mut self, phase: Phase, run: F) -> Result<()>
    where
        F: FnOnce(&mut StepContext<'_>, atomic_fs::FileList<'_>) -> Result<()>,
    {
        tracing::info!(%phase, "starting");
        self.reporter.phase_started(phase);

        let journal = self.journal.as_ref().ok_or(Error::Finished)?;
        let mut ctx = StepContext {
            layout: &self.layout,
            reporter: &mut *self.reporter,
            verbose: self.options.verbose,
        };
        run(&mut ctx, journal.files()).inspect_err(|e| self.reporter.phase_failed(phase, e))
    }

    /// Delete the journal; the transaction is over.
    fn finish(&mut self, outcome: Outcome) -> Result<Step> {
        let journal = self.journal.take().ok_or(Error::Finished)?;
        journal.remove()?;
        tracing::info!(?outcome, "transaction finished");
        Ok(Step::Done(outcome))
    }

    fn journal_mut(&mut self) -> Result<&mut Journal> {
        self.journal.as_mut().ok_or(Error::Finished)
    }
}
