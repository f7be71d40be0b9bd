//! The merge journal
//!
//! A journal is a single file: a fixed 19-byte header followed by the list of
//! entries to install. Its presence on disk is what marks a merge as in
//! progress; deleting it is the terminal action of both a completed install
//! and a completed rollback.
//!
//! ```text
//! offset 0   magic    4 bytes  "AIj!"
//! offset 4   version  u16 LE   0
//! offset 6   flags    u32 LE   milestone bitmask
//! offset 10  stage    u8       0..=3
//! offset 11  length   u64 LE   total file size
//! offset 19  entries  NUL-terminated paths, then a single NUL
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::io::{remove_file_durable, sync_parent, write_at_durable};
use crate::{Error, MergeFlags, RelPath, Result, Stage, TreeWalker};

/// Signature at the start of every journal.
pub const JOURNAL_MAGIC: [u8; 4] = *b"AIj!";
/// The only format revision this build reads or writes.
pub const JOURNAL_VERSION: u16 = 0;
/// Size of the fixed header.
pub const HEADER_LEN: usize = 19;

const FLAGS_OFFSET: u64 = 6;
const STAGE_OFFSET: u64 = 10;

/// What to do when another process already holds the journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Fail immediately with [`Error::Locked`].
    #[default]
    Fail,
    /// Block until the other holder releases it.
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    magic: [u8; 4],
    version: u16,
    flags: u32,
    stage: u8,
    length: u64,
}

impl Header {
    fn new(length: u64) -> Self {
        Self {
            magic: JOURNAL_MAGIC,
            version: JOURNAL_VERSION,
            flags: 0,
            stage: Stage::CopyNew.as_u8(),
            length,
        }
    }

    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..10].copy_from_slice(&self.flags.to_le_bytes());
        out[10] = self.stage;
        out[11..19].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&raw[0..4]);
        let mut version = [0u8; 2];
        version.copy_from_slice(&raw[4..6]);
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&raw[6..10]);
        let mut length = [0u8; 8];
        length.copy_from_slice(&raw[11..19]);
        Self {
            magic,
            version: u16::from_le_bytes(version),
            flags: u32::from_le_bytes(flags),
            stage: raw[10],
            length: u64::from_le_bytes(length),
        }
    }
}

/// An open, exclusively locked journal.
///
/// The file contents are read once into a buffer owned by the handle; the
/// entry list is served from that buffer until the handle is closed.
pub struct Journal {
    path: PathBuf,
    file: File,
    buf: Vec<u8>,
    entries: Vec<Range<usize>>,
    flags: MergeFlags,
    stage: Stage,
}

impl Journal {
    /// Write a fresh journal listing every entry below `source_root`.
    ///
    /// The header is written twice: first with a zero length, and again with
    /// the real length only after the entry list is on disk. A journal whose
    /// creation was cut short therefore fails validation on open.
    pub fn create(journal_path: &Path, source_root: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(journal_path)
            .map_err(|e| Error::io(journal_path, e))?;
        acquire_lock(&file, journal_path, LockMode::Fail)?;

        // A half-written journal would block every later run; drop it.
        if let Err(e) = write_journal(&file, journal_path, source_root) {
            if let Err(cleanup) = std::fs::remove_file(journal_path) {
                tracing::warn!(
                    journal = %journal_path.display(),
                    error = %cleanup,
                    "failed to remove incomplete journal"
                );
            }
            return Err(e);
        }

        FileExt::unlock(&file).map_err(|e| Error::io(journal_path, e))?;
        Ok(())
    }

    /// Open and validate an existing journal, taking its exclusive lock.
    ///
    /// A missing file is reported as [`Error::NotFound`]; any structural
    /// problem as [`Error::InvalidJournal`].
    pub fn open(journal_path: &Path, lock: LockMode) -> Result<Self> {
        let file = match OpenOptions::new().read(true).write(true).open(journal_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    path: journal_path.to_path_buf(),
                });
            }
            Err(e) => return Err(Error::io(journal_path, e)),
        };
        acquire_lock(&file, journal_path, lock)?;

        let size = file
            .metadata()
            .map_err(|e| Error::io(journal_path, e))?
            .len();
        if size < HEADER_LEN as u64 {
            return Err(Error::invalid_journal(
                journal_path,
                format!("file is {size} bytes, shorter than the header"),
            ));
        }

        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        (&file)
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(journal_path, e))?;

        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&buf[..HEADER_LEN]);
        let header = Header::decode(&raw);

        if header.magic != JOURNAL_MAGIC {
            return Err(Error::invalid_journal(journal_path, "bad magic"));
        }
        if header.version != JOURNAL_VERSION {
            return Err(Error::invalid_journal(
                journal_path,
                format!("unsupported version {}", header.version),
            ));
        }
        if header.length != size || buf.len() as u64 != size {
            return Err(Error::invalid_journal(
                journal_path,
                format!(
                    "recorded length {} does not match file size {size}",
                    header.length
                ),
            ));
        }
        let stage = Stage::from_u8(header.stage).ok_or_else(|| {
            Error::invalid_journal(journal_path, format!("unknown stage {}", header.stage))
        })?;
        let entries = scan_entries(&buf)
            .map_err(|reason| Error::invalid_journal(journal_path, reason))?;

        let flags = MergeFlags::from_bits_retain(header.flags);
        tracing::debug!(
            journal = %journal_path.display(),
            %flags,
            %stage,
            entries = entries.len(),
            "journal opened"
        );

        Ok(Self {
            path: journal_path.to_path_buf(),
            file,
            buf,
            entries,
            flags,
            stage,
        })
    }

    /// Release the lock and drop the buffered contents.
    pub fn close(self) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|e| Error::io(&self.path, e))
    }

    /// Delete the journal, ending the transaction.
    ///
    /// The file is unlinked while the lock is still held.
    #[cfg(unix)]
    pub fn remove(self) -> Result<()> {
        remove_file_durable(&self.path)?;
        tracing::debug!(journal = %self.path.display(), "journal removed");
        self.close()
    }

    /// Delete the journal, ending the transaction.
    #[cfg(not(unix))]
    pub fn remove(self) -> Result<()> {
        let path = self.path.clone();
        self.close()?;
        remove_file_durable(&path)?;
        tracing::debug!(journal = %path.display(), "journal removed");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> MergeFlags {
        self.flags
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Total size recorded in the header.
    pub fn length(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Entries recorded at creation, in journal order.
    pub fn files(&self) -> FileList<'_> {
        FileList {
            buf: &self.buf,
            ranges: self.entries.iter(),
        }
    }

    /// Persist new milestone flags. Returns once they are on disk.
    pub fn set_flags(&mut self, flags: MergeFlags) -> Result<()> {
        write_at_durable(&self.file, &self.path, FLAGS_OFFSET, &flags.bits().to_le_bytes())?;
        tracing::debug!(from = %self.flags, to = %flags, "journal flags updated");
        self.flags = flags;
        Ok(())
    }

    /// Persist the current pipeline stage. Returns once it is on disk.
    pub fn set_stage(&mut self, stage: Stage) -> Result<()> {
        if stage == self.stage {
            return Ok(());
        }
        write_at_durable(&self.file, &self.path, STAGE_OFFSET, &[stage.as_u8()])?;
        tracing::debug!(%stage, "journal stage updated");
        self.stage = stage;
        Ok(())
    }
}

fn write_journal(file: &File, journal_path: &Path, source_root: &Path) -> Result<()> {
    file.set_len(0).map_err(|e| Error::io(journal_path, e))?;

    let mut walker = TreeWalker::new(source_root);
    let mut written = HEADER_LEN as u64;
    let mut count = 0usize;
    {
        let mut out = BufWriter::new(file);
        out.write_all(&Header::new(0).encode())
            .map_err(|e| Error::io(journal_path, e))?;
        for entry in walker.by_ref() {
            let entry = entry?;
            out.write_all(entry.as_bytes())
                .and_then(|()| out.write_all(&[0]))
                .map_err(|e| Error::io(journal_path, e))?;
            written += entry.encoded_len();
            count += 1;
        }
        out.write_all(&[0]).map_err(|e| Error::io(journal_path, e))?;
        written += 1;
        out.flush().map_err(|e| Error::io(journal_path, e))?;
    }
    file.sync_data().map_err(|e| Error::io(journal_path, e))?;

    let length = HEADER_LEN as u64 + walker.list_len() + 1;
    debug_assert_eq!(length, written);

    write_at_durable(file, journal_path, 0, &Header::new(length).encode())?;
    sync_parent(journal_path)?;

    tracing::info!(
        journal = %journal_path.display(),
        entries = count,
        length,
        "journal created"
    );
    Ok(())
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("stage", &self.stage)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Iterator over the entries of an open journal.
#[derive(Debug, Clone)]
pub struct FileList<'a> {
    buf: &'a [u8],
    ranges: std::slice::Iter<'a, Range<usize>>,
}

impl Iterator for FileList<'_> {
    type Item = RelPath;

    fn next(&mut self) -> Option<RelPath> {
        let range = self.ranges.next()?;
        Some(RelPath::from_validated(&self.buf[range.clone()]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ranges.size_hint()
    }
}

impl ExactSizeIterator for FileList<'_> {}

fn acquire_lock(file: &File, path: &Path, mode: LockMode) -> Result<()> {
    let result = match mode {
        LockMode::Fail => file.try_lock_exclusive(),
        LockMode::Wait => file.lock_exclusive(),
    };
    result.map_err(|e| {
        if e.kind() == io::ErrorKind::WouldBlock
            || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
        {
            Error::Locked {
                path: path.to_path_buf(),
            }
        } else {
            Error::io(path, e)
        }
    })
}

/// Locate every entry in the trailer, checking it ends with exactly one
/// empty terminator entry.
fn scan_entries(buf: &[u8]) -> std::result::Result<Vec<Range<usize>>, String> {
    let mut entries = Vec::new();
    let mut pos = HEADER_LEN;
    loop {
        let Some(nul) = buf[pos..].iter().position(|&b| b == 0) else {
            return Err(format!("unterminated entry at offset {pos}"));
        };
        let end = pos + nul;
        if end == pos {
            if end + 1 != buf.len() {
                return Err(format!("trailing data after list terminator at offset {end}"));
            }
            return Ok(entries);
        }
        RelPath::from_bytes(&buf[pos..end])
            .map_err(|e| format!("entry at offset {pos}: {e}"))?;
        entries.push(pos..end);
        pos = end + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn source_tree() -> assert_fs::TempDir {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a/b.txt").write_str("b").unwrap();
        temp.child("src/a/c/d.txt").write_str("d").unwrap();
        temp
    }

    #[test]
    fn header_layout_is_fixed() {
        let header = Header {
            magic: JOURNAL_MAGIC,
            version: 0,
            flags: 0x0102_0304,
            stage: 2,
            length: 0x1122,
        };
        let raw = header.encode();
        assert_eq!(&raw[0..4], b"AIj!");
        assert_eq!(&raw[4..6], &[0, 0]);
        assert_eq!(&raw[6..10], &[4, 3, 2, 1]);
        assert_eq!(raw[10], 2);
        assert_eq!(&raw[11..19], &[0x22, 0x11, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Header::decode(&raw), header);
    }

    #[test]
    fn failed_create_leaves_no_journal() {
        let temp = assert_fs::TempDir::new().unwrap();
        let journal_path = temp.path().join("journal");

        let err = Journal::create(&journal_path, &temp.path().join("missing")).unwrap_err();

        assert!(matches!(err, Error::Io { .. } | Error::NotFound { .. }), "{err:?}");
        assert!(!journal_path.exists());
    }

    #[test]
    fn create_then_open_lists_files() {
        let temp = source_tree();
        let journal_path = temp.path().join("journal");

        Journal::create(&journal_path, &temp.path().join("src")).unwrap();
        let journal = Journal::open(&journal_path, LockMode::Fail).unwrap();

        let files: Vec<String> = journal.files().map(|p| p.to_string()).collect();
        assert_eq!(files, vec!["a/b.txt", "a/c/d.txt"]);
        assert_eq!(journal.flags(), MergeFlags::empty());
        assert_eq!(journal.stage(), Stage::CopyNew);
        // header + "a/b.txt\0" + "a/c/d.txt\0" + terminator
        assert_eq!(journal.length(), 19 + 8 + 10 + 1);
        assert_eq!(fs::metadata(&journal_path).unwrap().len(), journal.length());
        journal.close().unwrap();
    }

    #[test]
    fn empty_source_gives_single_terminator() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src").create_dir_all().unwrap();
        let journal_path = temp.path().join("journal");

        Journal::create(&journal_path, &temp.path().join("src")).unwrap();
        let journal = Journal::open(&journal_path, LockMode::Fail).unwrap();
        assert_eq!(journal.files().len(), 0);
        assert_eq!(journal.length(), HEADER_LEN as u64 + 1);
    }

    #[test]
    fn missing_journal_is_not_found() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = Journal::open(&temp.path().join("absent"), LockMode::Fail).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn torn_journal_is_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let journal_path = temp.path().join("journal");
        // Provisional header and full list on disk, final header never written.
        let mut bytes = Header::new(0).encode().to_vec();
        bytes.extend_from_slice(b"a/b.txt\0a/c/d.txt\0\0");
        fs::write(&journal_path, &bytes).unwrap();

        let err = Journal::open(&journal_path, LockMode::Fail).unwrap_err();

        assert!(matches!(err, Error::InvalidJournal { .. }), "got {err:?}");
        assert!(err.to_string().contains("does not match file size"), "{err}");
    }

    #[test]
    fn flag_and_stage_updates_persist() {
        let temp = source_tree();
        let journal_path = temp.path().join("journal");
        Journal::create(&journal_path, &temp.path().join("src")).unwrap();

        let mut journal = Journal::open(&journal_path, LockMode::Fail).unwrap();
        let flags = MergeFlags::COPIED_NEW | MergeFlags::BACKED_OLD_UP;
        journal.set_flags(flags).unwrap();
        journal.set_stage(Stage::Replace).unwrap();
        journal.close().unwrap();

        let reopened = Journal::open(&journal_path, LockMode::Fail).unwrap();
        assert_eq!(reopened.flags(), flags);
        assert_eq!(reopened.stage(), Stage::Replace);
    }

    #[test]
    fn unknown_header_bits_survive_flag_updates() {
        let temp = source_tree();
        let journal_path = temp.path().join("journal");
        Journal::create(&journal_path, &temp.path().join("src")).unwrap();
        let mut bytes = fs::read(&journal_path).unwrap();
        bytes[6..10].copy_from_slice(&0x0100_u32.to_le_bytes());
        fs::write(&journal_path, &bytes).unwrap();

        let mut journal = Journal::open(&journal_path, LockMode::Fail).unwrap();
        assert_eq!(journal.flags().unknown_bits(), 0x100);
        journal.set_flags(journal.flags() | MergeFlags::COPIED_NEW).unwrap();
        journal.close().unwrap();

        let reopened = Journal::open(&journal_path, LockMode::Fail).unwrap();
        assert_eq!(reopened.flags().bits(), 0x101);
    }

    #[test]
    fn second_open_is_refused_while_held() {
        let temp = source_tree();
        let journal_path = temp.path().join("journal");
        Journal::create(&journal_path, &temp.path().join("src")).unwrap();

        let held = Journal::open(&journal_path, LockMode::Fail).unwrap();
        let err = Journal::open(&journal_path, LockMode::Fail).unwrap_err();
        assert!(matches!(err, Error::Locked { .. }), "got {err:?}");

        held.close().unwrap();
        Journal::open(&journal_path, LockMode::Fail).unwrap();
    }

    #[test]
    fn remove_deletes_the_file() {
        let temp = source_tree();
        let journal_path = temp.path().join("journal");
        Journal::create(&journal_path, &temp.path().join("src")).unwrap();

        Journal::open(&journal_path, LockMode::Fail)
            .unwrap()
            .remove()
            .unwrap();
        assert!(!journal_path.exists());
    }

    #[test]
    fn scan_rejects_trailing_garbage() {
        let mut buf = Header::new(0).encode().to_vec();
        buf.extend_from_slice(b"a\0\0x");
        assert!(scan_entries(&buf).is_err());
    }

    #[test]
    fn scan_rejects_traversal_entries() {
        let mut buf = Header::new(0).encode().to_vec();
        buf.extend_from_slice(b"../etc/passwd\0\0");
        assert!(scan_entries(&buf).is_err());
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let temp = source_tree();
        let journal_path = temp.path().join("journal");
        Journal::create(&journal_path, &temp.path().join("src")).unwrap();

        let mut bytes = fs::read(&journal_path).unwrap();
        bytes[10] = 9;
        fs::write(&journal_path, &bytes).unwrap();

        let err = Journal::open(&journal_path, LockMode::Fail).unwrap_err();
        assert!(matches!(err, Error::InvalidJournal { .. }));
    }
}
