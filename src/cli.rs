//! Command-line surface: `n2kd [-d] [-q] [-o] [-r] [-p <port>]`.

use clap::Parser;

/// How the server treats its own stdout descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutMode {
    /// Mirror every ingested record to stdout; nothing else.
    PassThrough,
    /// Mirror every ingested record to stdout, and feed client-injected
    /// lines back into the ingester as synthetic records.
    Copy,
    /// Never write to stdout.
    Sink,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "n2kd",
    version,
    about = "Real-time NMEA 2000 state aggregator and fan-out server"
)]
pub struct Cli {
    /// Set debug log level.
    #[arg(short = 'd', long = "debug", conflicts_with = "quiet")]
    pub debug: bool,

    /// Set error log level.
    #[arg(short = 'q', long = "quiet", conflicts_with = "debug")]
    pub quiet: bool,

    /// Stdout mode: tee client input into the ingester.
    #[arg(short = 'o', long = "stdout-copy", conflicts_with = "stdout_sink")]
    pub stdout_copy: bool,

    /// Stdout mode: discard everything written to stdout.
    #[arg(short = 'r', long = "stdout-sink", conflicts_with = "stdout_copy")]
    pub stdout_sink: bool,

    /// JSON port. NMEA 0183 listens on `port + 1`.
    #[arg(short = 'p', long = "port", default_value_t = 2597)]
    pub port: u16,
}

impl Cli {
    pub fn stdout_mode(&self) -> StdoutMode {
        if self.stdout_copy {
            StdoutMode::Copy
        } else if self.stdout_sink {
            StdoutMode::Sink
        } else {
            StdoutMode::PassThrough
        }
    }

    /// Default `tracing` filter used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}
