//! Signal wiring

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::{SIGINT, SIGTERM};

#[cfg(unix)]
const TERMINATION: &[i32] = &[SIGINT, SIGTERM, signal_hook::consts::SIGHUP];
#[cfg(not(unix))]
const TERMINATION: &[i32] = &[SIGINT, SIGTERM];

/// Coordination signals whose default action would kill the process.
#[cfg(unix)]
const IGNORED: &[i32] = &[signal_hook::consts::SIGUSR1, signal_hook::consts::SIGUSR2];
#[cfg(not(unix))]
const IGNORED: &[i32] = &[];

/// Raise `interrupt` on any termination signal. Repeated signals only set it
/// again; the engine decides when to stop.
///
/// Coordination signals are caught into a flag nobody reads, which replaces
/// their default action.
pub fn install(interrupt: &Arc<AtomicBool>) -> io::Result<()> {
    for &signal in TERMINATION {
        signal_hook::flag::register(signal, Arc::clone(interrupt))?;
    }
    let ignored = Arc::new(AtomicBool::new(false));
    for &signal in IGNORED {
        signal_hook::flag::register(signal, Arc::clone(&ignored))?;
    }
    tracing::debug!(
        termination = TERMINATION.len(),
        ignored = IGNORED.len(),
        "signal handlers installed"
    );
    Ok(())
}
