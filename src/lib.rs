//! n2kd: real-time NMEA 2000 state aggregator and fan-out server.
//!
//! See `server` for the event-loop-equivalent task graph that ties the
//! other modules together.

pub mod cli;
pub mod clock;
pub mod error;
pub mod ingest;
pub mod model;
pub mod registry;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod store_actor;

pub use cli::{Cli, StdoutMode};
pub use error::N2kdError;

/// Bind the listeners described by `cli` and run the server until a fatal
/// error or shutdown signal. Per-client and silent-drop errors (§7) never
/// surface here — only the fatal class does.
pub async fn run(cli: Cli) -> Result<(), N2kdError> {
    server::run(cli).await
}
