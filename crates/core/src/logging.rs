//! Thin `tracing` init helper.
//!
//! Mirrors the teacher repo's use of `tracing` for structured logging; the
//! actual sink (file, stdout, whatever the CLI chooses) stays an external
//! collaborator per spec.md §1 ("CLI argument parsing, logging sinks... out
//! of scope"). This module only wires up a subscriber so `tracing::warn!`
//! calls in `fwi`/`weather`/`model` go somewhere during tests and CLI runs.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialise a process-wide `tracing` subscriber at `level`, honouring
/// `RUST_LOG` if set. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
