//! Build directory trees from a file list and snapshot them back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

/// Write `files` (relative path, contents) under `root`, creating parents.
///
/// # Panics
/// Panics if any filesystem operation fails.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(root)
        .unwrap_or_else(|e| panic!("write_tree: failed to create {}: {e}", root.display()));
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("write_tree: failed to create {}: {e}", parent.display())
            });
        }
        fs::write(&path, contents)
            .unwrap_or_else(|e| panic!("write_tree: failed to write {}: {e}", path.display()));
    }
}

/// Every entry below `root`, keyed by `/`-separated relative path.
///
/// Directories are included so that stray empty directories show up in
/// comparisons. Symlinks are recorded by target, never followed.
///
/// # Panics
/// Panics if the tree cannot be read.
pub fn snapshot(root: &Path) -> BTreeMap<String, Node> {
    let mut out = BTreeMap::new();
    collect(root, "", &mut out);
    out
}

fn collect(dir: &Path, prefix: &str, out: &mut BTreeMap<String, Node>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("snapshot: failed to read {}: {e}", dir.display()));
    for entry in entries {
        let entry = entry.unwrap_or_else(|e| panic!("snapshot: bad entry in {}: {e}", dir.display()));
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        let meta = fs::symlink_metadata(&path)
            .unwrap_or_else(|e| panic!("snapshot: failed to stat {}: {e}", path.display()));

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&path).unwrap();
            out.insert(rel, Node::Symlink(target));
        } else if meta.is_dir() {
            collect(&path, &rel, out);
            out.insert(rel, Node::Dir);
        } else {
            out.insert(rel, Node::File(fs::read(&path).unwrap()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sees_written_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("a/b.txt", "b"), ("top", "t")]);

        let snap = snapshot(dir.path());
        assert_eq!(snap.get("a"), Some(&Node::Dir));
        assert_eq!(snap.get("a/b.txt"), Some(&Node::File(b"b".to_vec())));
        assert_eq!(snap.get("top"), Some(&Node::File(b"t".to_vec())));
        assert_eq!(snap.len(), 3);
    }
}
