//! Shared test utilities for the atomic-install workspace.
//!
//! Fixtures used by the engine, CLI and integration suites so that trees
//! are built and compared the same way everywhere. Dev-dependency only.
//!
//! # Modules
//!
//! - [`tree`]: writing trees from a file list and snapshotting them for comparison
//! - [`workspace`]: [`MergeWorkspace`] with source, destination and journal paths

pub mod tree;
pub mod workspace;

pub use tree::{Node, snapshot, write_tree};
pub use workspace::MergeWorkspace;
