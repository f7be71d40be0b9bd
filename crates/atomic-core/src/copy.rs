//! Single-entry copy primitive
//!
//! Regular files are copied with their permission bits, ownership and
//! timestamps; symbolic links are recreated pointing at the same target with
//! the same ownership and timestamps. Anything else is refused.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::{Error, Result};

/// Copy `src` to `dst`, replacing whatever non-directory `dst` holds.
///
/// The copied data is synced before returning.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src).map_err(|e| Error::io(src, e))?;
    let file_type = meta.file_type();

    remove_existing(dst)?;

    if file_type.is_file() {
        fs::copy(src, dst).map_err(|e| Error::io(dst, e))?;
        preserve_metadata(&meta, dst)?;
        File::open(dst)
            .and_then(|f| f.sync_all())
            .map_err(|e| Error::io(dst, e))?;
        Ok(())
    } else if file_type.is_symlink() {
        let target = fs::read_link(src).map_err(|e| Error::io(src, e))?;
        make_symlink(&target, dst)?;
        preserve_metadata(&meta, dst)
    } else {
        Err(Error::UnsupportedFileType {
            path: src.to_path_buf(),
        })
    }
}

/// Apply the owner, mode and timestamps of `meta` to `dst` without following
/// a link at `dst`.
fn preserve_metadata(meta: &fs::Metadata, dst: &Path) -> Result<()> {
    let is_symlink = meta.file_type().is_symlink();
    set_owner(meta, dst)?;
    // chown may clear set-id bits
    if !is_symlink {
        fs::set_permissions(dst, meta.permissions()).map_err(|e| Error::io(dst, e))?;
    }

    let atime = FileTime::from_last_access_time(meta);
    let mtime = FileTime::from_last_modification_time(meta);
    let result = if is_symlink {
        filetime::set_symlink_file_times(dst, atime, mtime)
    } else {
        filetime::set_file_times(dst, atime, mtime)
    };
    result.map_err(|e| Error::io(dst, e))
}

#[cfg(unix)]
fn set_owner(meta: &fs::Metadata, dst: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    match std::os::unix::fs::lchown(dst, Some(meta.uid()), Some(meta.gid())) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::trace!(path = %dst.display(), uid = meta.uid(), gid = meta.gid(), "ownership not preserved");
            Ok(())
        }
        Err(e) => Err(Error::io(dst, e)),
    }
}

#[cfg(not(unix))]
fn set_owner(_meta: &fs::Metadata, _dst: &Path) -> Result<()> {
    Ok(())
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map_err(|e| Error::io(path, e)),
        Ok(_) => fs::remove_file(path).map_err(|e| Error::io(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link, e))
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(Error::UnsupportedFileType {
        path: link.to_path_buf(),
    })
}
