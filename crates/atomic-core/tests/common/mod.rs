#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use atomic_core::{
    Error, LockMode, MergeEngine, MergeFlags, MergeLayout, MergeOptions, Outcome, Phase, Reporter,
    open_journal,
};
use atomic_fs::{Journal, RelPath};
use atomic_test_utils::MergeWorkspace;

/// Reporter that remembers everything it was told.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub phases: Vec<Phase>,
    pub failed: Vec<Phase>,
    pub entries: Vec<(Phase, String)>,
    pub rollback_impossible: bool,
    pub finished: Option<Outcome>,
}

impl Reporter for RecordingReporter {
    fn phase_started(&mut self, phase: Phase) {
        self.phases.push(phase);
    }

    fn phase_failed(&mut self, phase: Phase, _error: &Error) {
        self.failed.push(phase);
    }

    fn entry(&mut self, phase: Phase, entry: &RelPath) {
        self.entries.push((phase, entry.to_string()));
    }

    fn rollback_impossible(&mut self) {
        self.rollback_impossible = true;
    }

    fn finished(&mut self, outcome: &Outcome) {
        self.finished = Some(*outcome);
    }
}

pub fn run_with(
    ws: &MergeWorkspace,
    options: MergeOptions,
    reporter: &mut RecordingReporter,
    interrupt: Option<Arc<AtomicBool>>,
) -> atomic_core::Result<Outcome> {
    let (journal, _) = open_journal(&ws.journal(), &ws.source(), &options)?;
    let layout = MergeLayout::new(ws.source(), ws.dest());
    let mut engine = MergeEngine::new(journal, layout, options, reporter);
    if let Some(flag) = interrupt {
        engine = engine.with_interrupt(flag);
    }
    engine.run()
}

pub fn run(ws: &MergeWorkspace, options: MergeOptions) -> atomic_core::Result<Outcome> {
    run_with(ws, options, &mut RecordingReporter::default(), None)
}

pub fn step(ws: &MergeWorkspace) -> atomic_core::Result<Outcome> {
    run(
        ws,
        MergeOptions {
            one_step: true,
            ..MergeOptions::default()
        },
    )
}

pub fn rollback(ws: &MergeWorkspace) -> atomic_core::Result<Outcome> {
    run(
        ws,
        MergeOptions {
            rollback: true,
            ..MergeOptions::default()
        },
    )
}

/// Flags currently persisted in the workspace journal.
pub fn journal_flags(ws: &MergeWorkspace) -> MergeFlags {
    Journal::open(&ws.journal(), LockMode::Fail)
        .expect("journal should open")
        .flags()
}

pub const SOURCE: &[(&str, &str)] = &[
    ("a/b.txt", "new b"),
    ("a/c/d.txt", "new d"),
    ("top.txt", "new top"),
];

pub const DEST: &[(&str, &str)] = &[
    ("a/b.txt", "old b"),
    ("keep.txt", "untouched"),
    ("top.txt", "old top"),
];
