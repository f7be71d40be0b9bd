//! Durable I/O helpers
//!
//! Every helper here returns only after the change has been handed to
//! stable storage, so callers may record the step as done afterwards.

use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::{Error, Result};

/// Overwrite `bytes` at `offset` and flush the file data to disk.
pub fn write_at_durable(file: &File, path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io(path, e))?;
    handle.write_all(bytes).map_err(|e| Error::io(path, e))?;
    file.sync_data().map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Flush a directory so that renames, creations and unlinks inside it
/// survive a crash.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir).map_err(|e| Error::io(dir, e))?;
    handle.sync_all().map_err(|e| Error::io(dir, e))
}

/// Directory entries cannot be synced through a handle on this platform.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Flush the directory containing `path`.
pub fn sync_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
        _ => sync_dir(Path::new(".")),
    }
}

/// Unlink a file and flush its directory.
pub fn remove_file_durable(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| Error::io(path, e))?;
    sync_parent(path)
}
