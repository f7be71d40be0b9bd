//! CLI argument parsing using clap derive

use std::path::PathBuf;

use atomic_core::{LockMode, MergeOptions};
use clap::Parser;

/// Atomically install a file tree over another, resumably and with rollback
#[derive(Parser, Debug)]
#[command(name = "atomic-install")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Journal file recording the transaction
    pub journal: PathBuf,

    /// Tree to install
    pub source: PathBuf,

    /// Tree to install into
    pub dest: PathBuf,

    /// Stop before replacing any destination file
    #[arg(short = 'n', long, env = "ATOMIC_INSTALL_NO_REPLACE")]
    pub no_replace: bool,

    /// Perform a single step, then exit
    #[arg(short = '1', long = "onestep", env = "ATOMIC_INSTALL_ONESTEP")]
    pub one_step: bool,

    /// Only resume an existing journal, never create one
    #[arg(short = 'r', long, env = "ATOMIC_INSTALL_RESUME")]
    pub resume: bool,

    /// Roll back the transaction recorded in the journal
    #[arg(short = 'R', long, env = "ATOMIC_INSTALL_ROLLBACK")]
    pub rollback: bool,

    /// Report every file and enable debug logging
    #[arg(short, long, env = "ATOMIC_INSTALL_VERBOSE")]
    pub verbose: bool,

    /// Wait for another process holding the journal instead of failing
    #[arg(short, long, env = "ATOMIC_INSTALL_WAIT")]
    pub wait: bool,
}

impl Cli {
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            rollback: self.rollback,
            no_replace: self.no_replace,
            one_step: self.one_step,
            resume: self.resume,
            verbose: self.verbose,
            lock: if self.wait {
                LockMode::Wait
            } else {
                LockMode::Fail
            },
        }
    }
}
