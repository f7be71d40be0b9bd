//! Relative entry paths as stored in the journal

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A path relative to the source (and destination) root.
///
/// Stored as raw OS bytes with `/` separators, which is exactly the journal
/// encoding. Converted to a platform-native path only at I/O boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath {
    inner: Vec<u8>,
}

impl RelPath {
    /// Parse a journal entry.
    ///
    /// Rejects empty paths, embedded NULs, absolute paths, and `.`/`..` or
    /// empty components, so an entry can never resolve outside its root.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let inner = bytes.into();
        if inner.is_empty() {
            return Err(Error::InvalidPath {
                message: "empty path".into(),
            });
        }
        if inner.contains(&0) {
            return Err(Error::InvalidPath {
                message: "path contains NUL".into(),
            });
        }
        if inner.starts_with(b"/") {
            return Err(Error::InvalidPath {
                message: format!("absolute path: {}", String::from_utf8_lossy(&inner)),
            });
        }
        for component in inner.split(|&b| b == b'/') {
            if component.is_empty() || component == b"." || component == b".." {
                return Err(Error::InvalidPath {
                    message: format!(
                        "path has an invalid component: {}",
                        String::from_utf8_lossy(&inner)
                    ),
                });
            }
        }
        Ok(Self { inner })
    }

    /// Wrap bytes already checked by [`RelPath::from_bytes`].
    pub(crate) fn from_validated(bytes: &[u8]) -> Self {
        Self {
            inner: bytes.to_vec(),
        }
    }

    /// A single-component path from a directory entry name.
    pub fn from_name(name: &OsStr) -> Self {
        Self {
            inner: os_to_bytes(name),
        }
    }

    /// Append a directory entry name.
    pub fn join(&self, name: &OsStr) -> Self {
        let mut inner = Vec::with_capacity(self.inner.len() + 1 + name.len());
        inner.extend_from_slice(&self.inner);
        inner.push(b'/');
        inner.extend_from_slice(&os_to_bytes(name));
        Self { inner }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Bytes this entry occupies in the journal, terminator included.
    pub fn encoded_len(&self) -> u64 {
        self.inner.len() as u64 + 1
    }

    /// The last component.
    pub fn file_name(&self) -> &OsStr {
        let start = self
            .inner
            .iter()
            .rposition(|&b| b == b'/')
            .map_or(0, |idx| idx + 1);
        bytes_to_os(&self.inner[start..])
    }

    /// The containing relative directory, `None` for top-level entries.
    pub fn parent(&self) -> Option<Self> {
        let idx = self.inner.iter().rposition(|&b| b == b'/')?;
        Some(Self {
            inner: self.inner[..idx].to_vec(),
        })
    }

    /// Convert to a platform-native relative path.
    pub fn to_native(&self) -> PathBuf {
        self.inner
            .split(|&b| b == b'/')
            .map(bytes_to_os)
            .collect()
    }

    /// Resolve this entry under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(self.to_native())
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.inner))
    }
}

impl TryFrom<&str> for RelPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::from_bytes(value.as_bytes())
    }
}

#[cfg(unix)]
fn os_to_bytes(name: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_to_bytes(name: &OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn bytes_to_os(bytes: &[u8]) -> &OsStr {
    use std::os::unix::ffi::OsStrExt;
    OsStr::from_bytes(bytes)
}

#[cfg(not(unix))]
fn bytes_to_os(bytes: &[u8]) -> &OsStr {
    // Entries written on this platform are always valid UTF-8.
    OsStr::new(std::str::from_utf8(bytes).unwrap_or("\u{fffd}"))
}

/// Build an `OsString` sibling name such as `.name.~ai-new~`.
pub fn decorated_name(name: &OsStr, prefix: &str, suffix: &str) -> OsString {
    let mut decorated = OsString::with_capacity(prefix.len() + name.len() + suffix.len());
    decorated.push(prefix);
    decorated.push(name);
    decorated.push(suffix);
    decorated
}
