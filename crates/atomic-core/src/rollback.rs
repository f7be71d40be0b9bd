//! Rollback pipeline
//!
//! Mirrors the forward steps in reverse. Like them, each undo is safe to run
//! again after a crash part way through.

use std::collections::BTreeSet;
use std::fs;

use atomic_fs::RelPath;

use crate::layout::CREATED_MARKER;
use crate::steps::{StepContext, TouchedDirs, ancestors, entry_exists, remove_entry, rename};
use crate::{Error, Phase, Result};

/// Undo a (possibly partial) replace and put every backup back.
///
/// An entry whose staged copy is gone while its destination exists was
/// replaced; the new entry is moved back to staging before the backup is
/// restored over the destination.
pub(crate) fn undo_replace(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    for entry in entries {
        let staged = ctx.layout.staged_path(&entry);
        let dest = ctx.layout.dest_path(&entry);
        let backup = ctx.layout.backup_path(&entry);

        if !entry_exists(&staged)? && entry_exists(&dest)? {
            ctx.announce(Phase::UndoReplace, &entry);
            rename(&dest, &staged)?;
            touched.touch(ctx.layout.dest_dir(&entry));
        }
        if entry_exists(&backup)? {
            rename(&backup, &dest)?;
            touched.touch(ctx.layout.dest_dir(&entry));
        }
    }
    touched.sync()
}

/// Restore backups left behind by an interrupted backup-old.
pub(crate) fn undo_backup(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    for entry in entries {
        let backup = ctx.layout.backup_path(&entry);
        if !entry_exists(&backup)? {
            continue;
        }
        let dest = ctx.layout.dest_path(&entry);
        if entry_exists(&dest)? {
            tracing::warn!(
                entry = %entry,
                backup = %backup.display(),
                "destination reappeared, leaving backup in place"
            );
            continue;
        }
        ctx.announce(Phase::UndoBackup, &entry);
        rename(&backup, &dest)?;
        touched.touch(ctx.layout.dest_dir(&entry));
    }
    touched.sync()
}

/// Remove every staged entry, then prune directories copy-new created once
/// nothing but their marker is left in them.
pub(crate) fn undo_copy(
    ctx: &mut StepContext<'_>,
    entries: impl Iterator<Item = RelPath>,
) -> Result<()> {
    let mut touched = TouchedDirs::default();
    let mut dirs = BTreeSet::new();
    for entry in entries {
        if remove_entry(&ctx.layout.staged_path(&entry))? {
            ctx.announce(Phase::UndoCopy, &entry);
        }
        touched.touch_ancestors(ctx.layout, &entry);
        dirs.extend(ancestors(&entry));
    }

    // Deepest first, so a parent is only tried once its children are gone.
    let mut dirs: Vec<RelPath> = dirs.into_iter().collect();
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.as_bytes().iter().filter(|&&b| b == b'/').count()));
    for dir in dirs {
        // A directory whose creation never reached its final name.
        remove_entry(&ctx.layout.staged_path(&dir))?;
        prune_created(ctx, &dir)?;
    }
    touched.sync()
}

fn prune_created(ctx: &StepContext<'_>, dir: &RelPath) -> Result<()> {
    let marker = ctx.layout.created_marker(dir);
    if !entry_exists(&marker)? {
        return Ok(());
    }
    let path = dir.under(ctx.layout.dest());
    let only_marker = fs::read_dir(&path)
        .map_err(|e| Error::io(&path, e))?
        .filter_map(|entry| entry.ok())
        .all(|entry| entry.file_name() == CREATED_MARKER);
    if !only_marker {
        tracing::debug!(dir = %dir, "created directory is not empty, keeping it");
        return Ok(());
    }
    remove_entry(&marker)?;
    match fs::remove_dir(&path) {
        Ok(()) => tracing::debug!(dir = %dir, "pruned created directory"),
        Err(e) => tracing::trace!(dir = %dir, error = %e, "directory kept"),
    }
    Ok(())
}
