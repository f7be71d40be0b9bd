//! atomic-install CLI
//!
//! Installs a source tree over a destination tree through a journaled,
//! resumable transaction.

mod cli;
mod error;
mod output;
mod signals;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use atomic_core::{JournalOrigin, MergeEngine, MergeLayout, Outcome, open_journal};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::Cli;
use error::{CliError, Result};
use output::ConsoleReporter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

/// `RUST_LOG` wins when set; otherwise warnings only, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{}: failed to set up logging: {e}", "warning".yellow().bold());
    }
}

fn run(cli: &Cli) -> Result<()> {
    let interrupt = Arc::new(AtomicBool::new(false));
    signals::install(&interrupt)?;

    let options = cli.merge_options();
    let (journal, origin) = open_journal(&cli.journal, &cli.source, &options)?;
    if origin == JournalOrigin::Created {
        tracing::debug!(journal = %cli.journal.display(), entries = journal.files().len(), "journal created");
    }

    let layout = MergeLayout::new(cli.source.clone(), cli.dest.clone());
    let mut reporter = ConsoleReporter::stdout();
    reporter.journal_opened(origin, options.rollback);
    let engine = MergeEngine::new(journal, layout, options, &mut reporter)
        .with_interrupt(Arc::clone(&interrupt));

    match engine.run()? {
        Outcome::Interrupted(state) => Err(CliError::Interrupted { state }),
        Outcome::Installed | Outcome::RolledBack | Outcome::Paused(_) => Ok(()),
    }
}
