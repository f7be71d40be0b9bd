//! End-to-end integration test for a complete install transaction
//!
//! Exercises the journal store and the merge engine together on the
//! `{a/b.txt, a/c/d.txt}` tree: journal bytes, forward run, interruption
//! followed by rollback, and lock exclusion.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use atomic_core::{
    Error, LockMode, MergeEngine, MergeLayout, MergeOptions, MergeState, NullReporter, Outcome,
    open_journal,
};
use atomic_fs::{HEADER_LEN, Journal, JOURNAL_MAGIC};
use atomic_test_utils::MergeWorkspace;
use pretty_assertions::assert_eq;

const TREE: &[(&str, &str)] = &[("a/b.txt", "bee"), ("a/c/d.txt", "dee")];

fn run(ws: &MergeWorkspace, options: MergeOptions) -> atomic_core::Result<Outcome> {
    let (journal, _) = open_journal(&ws.journal(), &ws.source(), &options)?;
    let mut reporter = NullReporter;
    MergeEngine::new(
        journal,
        MergeLayout::new(ws.source(), ws.dest()),
        options,
        &mut reporter,
    )
    .run()
}

#[test]
fn test_journal_bytes_for_sample_tree() {
    let ws = MergeWorkspace::with_trees(TREE, &[]);

    Journal::create(&ws.journal(), &ws.source()).unwrap();
    let bytes = fs::read(ws.journal()).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&JOURNAL_MAGIC);
    expected.extend_from_slice(&0u16.to_le_bytes());
    expected.extend_from_slice(&0u32.to_le_bytes());
    expected.push(0);
    expected.extend_from_slice(&38u64.to_le_bytes());
    expected.extend_from_slice(b"a/b.txt\0a/c/d.txt\0\0");
    assert_eq!(expected.len(), HEADER_LEN + 19);
    assert_eq!(bytes, expected);
}

#[test]
fn test_forward_run_into_empty_destination() {
    let ws = MergeWorkspace::with_trees(TREE, &[]);

    assert_eq!(run(&ws, MergeOptions::default()).unwrap(), Outcome::Installed);

    ws.assert_journal_missing();
    ws.assert_dest_file("a/b.txt", "bee");
    ws.assert_dest_file("a/c/d.txt", "dee");
    assert!(ws.leftovers().is_empty(), "leftovers: {:?}", ws.leftovers());
    assert_eq!(ws.dest_snapshot(), ws.source_snapshot());
}

#[test]
fn test_interrupt_after_copy_then_rollback_leaves_empty_destination() {
    let ws = MergeWorkspace::with_trees(TREE, &[]);
    let one_step = MergeOptions {
        one_step: true,
        ..MergeOptions::default()
    };
    assert_eq!(
        run(&ws, one_step).unwrap(),
        Outcome::Paused(MergeState::CopiedNew)
    );
    assert!(!ws.dest_snapshot().is_empty());

    let rollback = MergeOptions {
        rollback: true,
        ..MergeOptions::default()
    };
    assert_eq!(run(&ws, rollback).unwrap(), Outcome::RolledBack);

    assert!(ws.dest_snapshot().is_empty(), "{:?}", ws.dest_snapshot());
    ws.assert_journal_missing();
}

#[test]
fn test_signal_during_fresh_run_rolls_back() {
    let ws = MergeWorkspace::with_trees(TREE, &[]);
    let (journal, _) =
        open_journal(&ws.journal(), &ws.source(), &MergeOptions::default()).unwrap();
    let mut reporter = NullReporter;
    let engine = MergeEngine::new(
        journal,
        MergeLayout::new(ws.source(), ws.dest()),
        MergeOptions::default(),
        &mut reporter,
    )
    .with_interrupt(Arc::new(AtomicBool::new(true)));

    assert_eq!(engine.run().unwrap(), Outcome::Interrupted(None));
    assert!(ws.dest_snapshot().is_empty());
    ws.assert_journal_missing();
}

#[test]
fn test_second_opener_is_refused_while_engine_holds_journal() {
    let ws = MergeWorkspace::with_trees(TREE, &[]);
    let (held, _) = open_journal(&ws.journal(), &ws.source(), &MergeOptions::default()).unwrap();

    let err = run(&ws, MergeOptions::default()).unwrap_err();
    assert!(
        matches!(err, Error::Fs(atomic_fs::Error::Locked { .. })),
        "unexpected error: {err:?}"
    );
    ws.assert_dest_missing("a");

    held.close().unwrap();
    assert_eq!(run(&ws, MergeOptions::default()).unwrap(), Outcome::Installed);
}

#[test]
fn test_rollback_refused_after_replacement() {
    let ws = MergeWorkspace::with_trees(TREE, &[("a/b.txt", "old")]);
    let one_step = MergeOptions {
        one_step: true,
        ..MergeOptions::default()
    };
    for _ in 0..3 {
        run(&ws, one_step).unwrap();
    }
    let before = ws.dest_snapshot();

    let err = run(
        &ws,
        MergeOptions {
            rollback: true,
            ..MergeOptions::default()
        },
    )
    .unwrap_err();

    assert!(matches!(err, Error::RollbackImpossible));
    assert_eq!(ws.dest_snapshot(), before);
    let journal = Journal::open(&ws.journal(), LockMode::Fail).unwrap();
    assert_eq!(MergeState::from_flags(journal.flags()), MergeState::Replaced);
}
