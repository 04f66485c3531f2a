//! Fatal error class (§7): failures that abort the process.
//!
//! Only the startup-time failure (listener bind) is surfaced through this
//! type and propagated to `main`. Failures that can only occur once the
//! server is already running — stdin read/EOF, stdout write, clock read —
//! exit the process directly from inside the task that observed them,
//! the same way `clock::now_secs` does; there is no caller left to hand a
//! `Result` back to by that point; see `DESIGN.md`.

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum N2kdError {
    #[error("failed to bind {kind} listener on {addr}: {source}")]
    Bind {
        kind: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
