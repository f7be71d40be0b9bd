//! Where each journal entry lives during a merge
//!
//! Staged and backup copies sit next to their destination entry so that
//! every swap is a same-directory rename.

use std::path::{Path, PathBuf};

use atomic_fs::RelPath;
use atomic_fs::path::decorated_name;

const STAGED_SUFFIX: &str = ".~ai-new~";
const BACKUP_SUFFIX: &str = ".~ai-old~";
pub(crate) const CREATED_MARKER: &str = ".~ai-dir~";

/// Source and destination roots of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLayout {
    source: PathBuf,
    dest: PathBuf,
}

impl MergeLayout {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn source_path(&self, entry: &RelPath) -> PathBuf {
        entry.under(&self.source)
    }

    pub fn dest_path(&self, entry: &RelPath) -> PathBuf {
        entry.under(&self.dest)
    }

    /// `dest/dir/.name.~ai-new~`
    pub fn staged_path(&self, entry: &RelPath) -> PathBuf {
        self.sibling(entry, STAGED_SUFFIX)
    }

    /// `dest/dir/.name.~ai-old~`
    pub fn backup_path(&self, entry: &RelPath) -> PathBuf {
        self.sibling(entry, BACKUP_SUFFIX)
    }

    /// `dest/dir/.~ai-dir~`, present while `dir` is one the merge created.
    pub fn created_marker(&self, dir: &RelPath) -> PathBuf {
        dir.under(&self.dest).join(CREATED_MARKER)
    }

    /// Destination directory holding `entry` and its siblings.
    pub fn dest_dir(&self, entry: &RelPath) -> PathBuf {
        match entry.parent() {
            Some(parent) => parent.under(&self.dest),
            None => self.dest.clone(),
        }
    }

    fn sibling(&self, entry: &RelPath, suffix: &str) -> PathBuf {
        self.dest_dir(entry)
            .join(decorated_name(entry.file_name(), ".", suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_share_the_destination_directory() {
        let layout = MergeLayout::new("/src", "/dest");
        let entry = RelPath::try_from("a/c/d.txt").unwrap();

        assert_eq!(layout.source_path(&entry), Path::new("/src/a/c/d.txt"));
        assert_eq!(layout.dest_path(&entry), Path::new("/dest/a/c/d.txt"));
        assert_eq!(
            layout.staged_path(&entry),
            Path::new("/dest/a/c/.d.txt.~ai-new~")
        );
        assert_eq!(
            layout.backup_path(&entry),
            Path::new("/dest/a/c/.d.txt.~ai-old~")
        );
    }

    #[test]
    fn top_level_entries_live_in_dest_root() {
        let layout = MergeLayout::new("/src", "/dest");
        let entry = RelPath::try_from("f").unwrap();
        assert_eq!(layout.dest_dir(&entry), Path::new("/dest"));
        assert_eq!(layout.staged_path(&entry), Path::new("/dest/.f.~ai-new~"));
    }

    #[test]
    fn created_marker_sits_inside_the_directory() {
        let layout = MergeLayout::new("/src", "/dest");
        let dir = RelPath::try_from("a/c").unwrap();
        assert_eq!(layout.created_marker(&dir), Path::new("/dest/a/c/.~ai-dir~"));
        assert_eq!(layout.staged_path(&dir), Path::new("/dest/a/.c.~ai-new~"));
    }
}
