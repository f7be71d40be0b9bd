//! Forward pipeline: copy-new, backup-old, replace, cleanup
//!
//! Each step walks the whole entry list and can be re-run after a crash at
//! any point: entries already in their target state are skipped. Every
//! directory a step changed is synced before the step returns.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use atomic_fs::RelPath;

use crate::copy::copy_entry;
use crate::layout::CREATED_MARKER;
use crate::{Error, MergeLayout, Phase, Reporter, Result};

/// Shared inputs of every step.
pub(crate) struct StepContext<'a> {
    pub layout: &'a MergeLayout,
    pub reporter: &'a mut dyn Reporter,
    pub verbose: bool,
}

impl StepContext<'_> {
    pub(crate) fn announce(&mut self, phase: Phase, entry: &RelPath) {
        if self.verbose {
            self.reporter.entry(phase, entry);
        }
    }
}

/// Directories whose entries changed during a step.
#[derive(Debug, Default)]
pub(crate) struct TouchedDirs(BTreeSet<PathBuf>);

impl TouchedDirs {
    pub(crate) fn touch(&mut self, dir: PathBuf) {
        self.0.insert(dir);
    }

    /// Mark `entry`'s directory and every ancestor up to the destination root.
    pub(crate) fn touch_ancestors(&mut self, layout: &MergeLayout, entry: &RelPath) {
        let mut current = entry.parent();
        while let Some(dir) = current {
            current = dir.parent();
            self.0.insert(dir.under(layout.dest()));
        }
        self.0.insert(layout.dest().to_path_buf());
    }

    /// Sync every touched directory that still exists.
    pub(crate) fn sync(self) -> Result<()> {
        for dir in self.0 {
            if dir.is_dir() {
                atomic_fs::io::sync_dir(&dir)?;
            }
        }
        Ok(())
    }
}

/// Whether anything (file, link or directory) exists at `path`.
pub(crate) fn entry_exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

pub(crate) fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::io(from, e))
}

/// Remove a file, link or whole directory; absent is fine.
pub(crate) fn remove_entry(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path).map_err(|e| Error::io(path, e))?;
            Ok(true)
        }
        Ok(_) => {
            fs::remove_file(path).map_err(|e| Error::io(path, e))?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Ancestors of `entry`, nearest first. The destination root is not included.
pub(crate) fn ancestors(entry: &RelPath) -> impl Iterator<Item = RelPath> {
    std::iter::successors(entry.parent(), RelPath::parent)
}

/// Create the missing destination directories above `entry`.
///
/// Each one is built under its staged name with a marker inside and then
/// renamed into place, so a directory appears in the destination only once
/// it is recognisable as created by this merge.
fn create_parents(layout: &MergeLayout, entry: &RelPath) -> Result<()> {
    fs::create_dir_all(layout.dest()).map_err(|e| Error::io(layout.dest(), e))?;

    let mut missing = Vec::new();
    for dir in ancestors(entry) {
        if dir.under(layout.dest()).is_dir() {
            break;
        }
        missing.push(dir);
    }
    for dir in missing.into_iter().rev() {
        let staged = layout.staged_path(&dir);
        match fs::create_dir(&staged) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::io(&staged, e)),
        }
        let marker = staged.join(CREATED_MARKER);
        File::create(&marker)
            .and_then(|f| f.sync_all())
            .map_err(|e| Error::io(&marker, e))?;
        atomic_fs::io::sync_dir(&staged)?;
        rename(&staged, &dir.under(layout.dest()))?;
        tracing::debug!(dir = %dir, "created directory");
    }
    Ok(())
}

/// Copy every source entry to its staged path beside the destination.
pub(crate) fn copy_new(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    for entry in entries {
        ctx.announce(Phase::CopyNew, &entry);
        create_parents(ctx.layout, &entry)?;
        copy_entry(
            &ctx.layout.source_path(&entry),
            &ctx.layout.staged_path(&entry),
        )?;
        touched.touch_ancestors(ctx.layout, &entry);
    }
    touched.sync()
}

/// Move every existing destination entry to its backup path.
pub(crate) fn backup_old(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    for entry in entries {
        let dest = ctx.layout.dest_path(&entry);
        if !entry_exists(&dest)? {
            continue;
        }
        ctx.announce(Phase::BackupOld, &entry);
        rename(&dest, &ctx.layout.backup_path(&entry))?;
        tracing::debug!(entry = %entry, "backed up");
        touched.touch(ctx.layout.dest_dir(&entry));
    }
    touched.sync()
}

/// Rename every staged entry onto its destination.
pub(crate) fn replace(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    for entry in entries {
        let staged = ctx.layout.staged_path(&entry);
        let dest = ctx.layout.dest_path(&entry);
        if !entry_exists(&staged)? {
            if entry_exists(&dest)? {
                continue;
            }
            return Err(Error::MissingStaged {
                entry: entry.to_string(),
                dest,
            });
        }
        ctx.announce(Phase::Replace, &entry);
        rename(&staged, &dest)?;
        touched.touch(ctx.layout.dest_dir(&entry));
    }
    touched.sync()
}

/// Delete every backup left by [`backup_old`] and the markers of directories
/// created by [`copy_new`].
pub(crate) fn cleanup(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    let mut dirs = BTreeSet::new();
    for entry in entries {
        if remove_entry(&ctx.layout.backup_path(&entry))? {
            ctx.announce(Phase::Cleanup, &entry);
            touched.touch(ctx.layout.dest_dir(&entry));
        }
        dirs.extend(ancestors(&entry));
    }
    for dir in dirs {
        if remove_entry(&ctx.layout.created_marker(&dir))? {
            touched.touch(dir.under(ctx.layout.dest()));
        }
    }
    touched.sync()
}
