//! Console progress output

use std::io::{self, Write};

use atomic_core::{Error, JournalOrigin, Outcome, Phase, RelPath, Reporter};
use colored::Colorize;

/// Prints `* Phase...` progress lines, and `>>> path` per entry when verbose.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Announce whether this run continues a transaction or starts one.
    pub fn journal_opened(&mut self, origin: JournalOrigin, rollback: bool) {
        let marker = "*".green().bold().to_string();
        match origin {
            JournalOrigin::Existing if rollback => {
                self.line(&marker, "Journal file open, rolling back.")
            }
            JournalOrigin::Existing => self.line(&marker, "Journal file open, resuming."),
            JournalOrigin::Created => self.line(&marker, "Journal not found, creating..."),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    // Progress output is best effort; a closed stdout must not abort a merge.
    fn line(&mut self, marker: &str, text: &str) {
        let _ = writeln!(self.out, "{marker} {text}");
        let _ = self.out.flush();
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn phase_started(&mut self, phase: Phase) {
        let marker = if phase.is_rollback() {
            "*".yellow().bold()
        } else {
            "*".green().bold()
        };
        self.line(&marker.to_string(), &format!("{phase}..."));
    }

    fn phase_failed(&mut self, phase: Phase, error: &Error) {
        tracing::debug!(%phase, error = %error, "phase failed");
        let marker = "!".red().bold().to_string();
        self.line(&marker, &format!("{phase} failed."));
    }

    fn entry(&mut self, _phase: Phase, entry: &RelPath) {
        let _ = writeln!(self.out, ">>> {entry}");
    }

    fn rollback_impossible(&mut self) {
        let marker = "!".red().bold().to_string();
        self.line(&marker, "Replacement complete, rollback impossible.");
    }

    fn finished(&mut self, outcome: &Outcome) {
        let marker = "*".green().bold().to_string();
        match outcome {
            Outcome::Installed => self.line(&marker, "Install done."),
            Outcome::RolledBack | Outcome::Interrupted(None) => {
                self.line(&marker, "Rollback successful.")
            }
            Outcome::Paused(state) => self.line(&marker, &format!("Paused: {state}.")),
            Outcome::Interrupted(Some(_)) => {}
        }
    }
}
