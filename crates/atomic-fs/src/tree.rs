//! Depth-first enumeration of a source tree
//!
//! Yields every non-directory entry below a root as a [`RelPath`]. Directories
//! are descended into but never emitted, and symbolic links are not followed.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, RelPath, Result};

/// Lazy depth-first walk over a directory tree.
///
/// Entries of each directory are visited in byte-wise name order. The first
/// error ends the walk: it is yielded once and the iterator is fused after.
pub struct TreeWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    started: bool,
    finished: bool,
    list_len: u64,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let inner = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self {
            root,
            inner,
            started: false,
            finished: false,
            list_len: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Journal bytes taken by the entries yielded so far (each entry plus its
    /// NUL terminator).
    pub fn list_len(&self) -> u64 {
        self.list_len
    }

    // walkdir lists a non-directory root as its own single entry.
    fn check_root(&self) -> io::Result<()> {
        if fs::metadata(&self.root)?.is_dir() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                "source root is not a directory",
            ))
        }
    }

    fn relative(&self, path: &Path) -> Option<RelPath> {
        let mut parts = path.strip_prefix(&self.root).ok()?.iter();
        let first = RelPath::from_name(parts.next()?);
        Some(parts.fold(first, |rel, part| rel.join(part)))
    }

    fn emit(&mut self, path: &Path) -> Option<Result<RelPath>> {
        match self.relative(path) {
            Some(rel) => {
                self.list_len += rel.encoded_len();
                Some(Ok(rel))
            }
            None => self.fail(
                path.to_path_buf(),
                io::Error::other("entry outside the walked root"),
            ),
        }
    }

    fn fail(&mut self, path: PathBuf, source: io::Error) -> Option<Result<RelPath>> {
        self.finished = true;
        Some(Err(Error::io(path, source)))
    }
}

impl fmt::Debug for TreeWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeWalker")
            .field("root", &self.root)
            .field("finished", &self.finished)
            .field("list_len", &self.list_len)
            .finish_non_exhaustive()
    }
}

impl Iterator for TreeWalker {
    type Item = Result<RelPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.check_root() {
                return self.fail(self.root.clone(), e);
            }
        }

        loop {
            let entry = match self.inner.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    let path = err
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    let not_a_dir = err
                        .io_error()
                        .is_some_and(|e| e.kind() == io::ErrorKind::NotADirectory);
                    if not_a_dir && path != self.root {
                        tracing::debug!(path = %path.display(), "not a directory after all, listing as file");
                        return self.emit(&path);
                    }
                    return self.fail(path, io::Error::from(err));
                }
            };

            if entry.file_type().is_dir() {
                tracing::trace!(path = %entry.path().display(), "descending");
                continue;
            }
            return self.emit(entry.path());
        }
    }
}

impl std::iter::FusedIterator for TreeWalker {}

/// Collect every non-directory entry below `root`.
pub fn enumerate(root: impl AsRef<Path>) -> Result<Vec<RelPath>> {
    TreeWalker::new(root.as_ref()).collect()
}
