//! `n2kd`: reads decoded NMEA 2000 records from stdin, maintains the current
//! bus state, and serves it to TCP clients as snapshots or live streams.

use clap::Parser;
use n2kd::cli::Cli;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_filter())),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cli.port,
        stdout_mode = ?cli.stdout_mode(),
        "n2kd starting"
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: failed to start async runtime: {e}");
            std::process::exit(70);
        }
    };

    if let Err(e) = runtime.block_on(n2kd::run(cli)) {
        error!(error = %e, "fatal error");
        std::process::exit(70);
    }
}
