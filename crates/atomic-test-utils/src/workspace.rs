//! Temporary workspace holding a source tree, a destination tree and a
//! journal path.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::tree::{Node, snapshot, write_tree};

/// A throwaway merge setup.
///
/// Layout inside the temporary directory:
///
/// ```text
/// <tmp>/src/       tree to install
/// <tmp>/dest/      tree being replaced
/// <tmp>/journal    transaction journal (not created)
/// ```
pub struct MergeWorkspace {
    dir: TempDir,
}

impl MergeWorkspace {
    /// Create empty `src/` and `dest/` directories.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(dir.path().join("src")).expect("Failed to create src");
        fs::create_dir(dir.path().join("dest")).expect("Failed to create dest");
        Self { dir }
    }

    /// Workspace populated with the given source and destination files.
    pub fn with_trees(source: &[(&str, &str)], dest: &[(&str, &str)]) -> Self {
        let ws = Self::new();
        ws.write_source(source);
        ws.write_dest(dest);
        ws
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    pub fn dest(&self) -> PathBuf {
        self.dir.path().join("dest")
    }

    pub fn journal(&self) -> PathBuf {
        self.dir.path().join("journal")
    }

    pub fn write_source(&self, files: &[(&str, &str)]) {
        write_tree(&self.source(), files);
    }

    pub fn write_dest(&self, files: &[(&str, &str)]) {
        write_tree(&self.dest(), files);
    }

    pub fn source_snapshot(&self) -> BTreeMap<String, Node> {
        snapshot(&self.source())
    }

    pub fn dest_snapshot(&self) -> BTreeMap<String, Node> {
        snapshot(&self.dest())
    }

    /// Assert that a file exists under `dest/`.
    ///
    /// # Panics
    /// Panics if the file does not exist.
    pub fn assert_dest_file(&self, rel: &str, contents: &str) {
        let path = self.dest().join(rel);
        let actual = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Expected file to exist: {} ({e})", path.display()));
        assert_eq!(
            actual,
            contents,
            "File {} has unexpected contents",
            path.display()
        );
    }

    /// Assert that nothing, not even a dangling symlink, exists under `dest/`.
    ///
    /// # Panics
    /// Panics if the entry exists.
    pub fn assert_dest_missing(&self, rel: &str) {
        let path = self.dest().join(rel);
        assert!(
            fs::symlink_metadata(&path).is_err(),
            "Expected entry to not exist: {}",
            path.display()
        );
    }

    pub fn assert_journal_exists(&self) {
        assert!(
            self.journal().exists(),
            "Expected journal to exist: {}",
            self.journal().display()
        );
    }

    pub fn assert_journal_missing(&self) {
        assert!(
            !self.journal().exists(),
            "Expected journal to be gone: {}",
            self.journal().display()
        );
    }

    /// Entries under `dest/` carrying a staging or backup decoration.
    pub fn leftovers(&self) -> Vec<String> {
        self.dest_snapshot()
            .into_keys()
            .filter(|rel| {
                rel.ends_with(".~ai-new~") || rel.ends_with(".~ai-old~") || rel.ends_with(".~ai-dir~")
            })
            .collect()
    }
}

impl Default for MergeWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
