//! Property tests over randomly generated source and destination trees
//!
//! For any pair of trees, stopping after any number of steps and resuming
//! must give the same result as an uninterrupted run, and rolling back
//! before replacement must restore the destination exactly.

use std::collections::BTreeMap;

use atomic_core::{MergeEngine, MergeLayout, MergeOptions, NullReporter, Outcome, open_journal};
use atomic_test_utils::{MergeWorkspace, Node};
use proptest::prelude::*;

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

fn one_step() -> MergeOptions {
    MergeOptions {
        one_step: true,
        ..MergeOptions::default()
    }
}

/// Paths drawn from a small alphabet so source and destination overlap.
fn file_set() -> impl Strategy<Value = BTreeMap<String, String>> {
    let path = prop::sample::select(vec![
        "f", "g", "d/f", "d/g", "d/e/f", "x/y/z", "x/w",
    ]);
    prop::collection::btree_map(path, "[a-z]{0,12}", 0..6).prop_map(|map| {
        map.into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    })
}

/// Drop entries whose path is a prefix directory of another entry.
fn consistent(mut files: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let keys: Vec<String> = files.keys().cloned().collect();
    files.retain(|k, _| !keys.iter().any(|other| other.starts_with(&format!("{k}/"))));
    files
}

fn as_pairs(files: &BTreeMap<String, String>) -> Vec<(&str, &str)> {
    files.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn workspace(source: &BTreeMap<String, String>, dest: &BTreeMap<String, String>) -> MergeWorkspace {
    MergeWorkspace::with_trees(&as_pairs(source), &as_pairs(dest))
}

fn reference_install(
    source: &BTreeMap<String, String>,
    dest: &BTreeMap<String, String>,
) -> BTreeMap<String, Node> {
    let ws = workspace(source, dest);
    assert_eq!(run(&ws, MergeOptions::default()).unwrap(), Outcome::Installed);
    ws.dest_snapshot()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn resumed_install_matches_uninterrupted(
        source in file_set().prop_map(consistent),
        dest in file_set().prop_map(consistent),
        pause_after in 0usize..4,
    ) {
        // Both trees share one destination, so keep only non-conflicting shapes.
        let combined: BTreeMap<String, String> =
            dest.iter().chain(source.iter()).map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assume!(consistent(combined.clone()).len() == combined.len());

        let expected = reference_install(&source, &dest);

        let ws = workspace(&source, &dest);
        for _ in 0..pause_after {
            run(&ws, one_step()).unwrap();
        }
        prop_assert_eq!(run(&ws, MergeOptions::default()).unwrap(), Outcome::Installed);

        prop_assert_eq!(ws.dest_snapshot(), expected);
        prop_assert!(ws.leftovers().is_empty());
        prop_assert!(!ws.journal().exists());
    }

    #[test]
    fn rollback_before_replace_restores_destination(
        source in file_set().prop_map(consistent),
        dest in file_set().prop_map(consistent),
        steps in 0usize..3,
    ) {
        let combined: BTreeMap<String, String> =
            dest.iter().chain(source.iter()).map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assume!(consistent(combined.clone()).len() == combined.len());
        let ws = workspace(&source, &dest);
        let before = ws.dest_snapshot();

        let (journal, _) = open_journal(&ws.journal(), &ws.source(), &MergeOptions::default()).unwrap();
        journal.close().unwrap();
        for _ in 0..steps {
            run(&ws, one_step()).unwrap();
        }

        let rollback = MergeOptions { rollback: true, ..MergeOptions::default() };
        prop_assert_eq!(run(&ws, rollback).unwrap(), Outcome::RolledBack);
        prop_assert_eq!(ws.dest_snapshot(), before);
        prop_assert!(!ws.journal().exists());
    }
}
