//! Durable storage layer for atomic-install
//!
//! Provides the on-disk merge journal, its milestone flags, and the
//! source-tree enumeration that seeds it.

pub mod error;
pub mod flags;
pub mod io;
pub mod journal;
pub mod path;
pub mod tree;

pub use error::{Error, Result};
pub use flags::{MergeFlags, MergeState, Stage};
pub use journal::{FileList, Journal, LockMode, HEADER_LEN, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use path::RelPath;
pub use tree::{TreeWalker, enumerate};
