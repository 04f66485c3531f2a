//! The event-loop-equivalent task graph (§4.1, §4.4, §5).
//!
//! §4.1's single-threaded readiness loop is replaced, per the Design Notes'
//! licensed message-passing alternative, by one task per descriptor class:
//! the stdin reader, the stdout writer, the two listener
//! accept loops, and one task per accepted client. All of them reach the
//! store only through [`crate::store_actor::StoreActor`]'s channel, and all
//! streaming output flows through its broadcast channel, so ordering (§4.1
//! "Ordering guarantees") and single-writer discipline (§5) hold without a
//! shared lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::cli::{Cli, StdoutMode};
use crate::error::N2kdError;
use crate::ingest::LineReassembler;
use crate::registry::{ClientGuard, Registry};
use crate::store_actor::{BroadcastHandle, StoreActor, StoreCommand, StoreHandle};

/// How long a freshly accepted JSON client has to send a `-\n` upgrade line
/// before it is served a one-shot snapshot (§4.1 step 1, §6).
pub const ONESHOT_DEADLINE: Duration = Duration::from_millis(500);

/// Runtime exit code for fatal errors (§7), distinct from clap's own exit
/// code 1 for argument errors.
pub const EXIT_FATAL: i32 = 70;

pub async fn run(cli: Cli) -> Result<(), N2kdError> {
    let (store, broadcast_tx) = StoreActor::spawn();
    let registry = Registry::new();

    let json_listener = bind_listener(cli.port, "json").await?;
    let nmea_listener = bind_listener(cli.port + 1, "nmea0183").await?;
    info!(port = cli.port, "json listener bound");
    info!(port = cli.port + 1, "nmea0183 listener bound");

    let stdout_tx = spawn_stdout_writer(cli.stdout_mode(), broadcast_tx.subscribe(), store.clone());
    spawn_stdin_reader(store.clone());

    tokio::select! {
        () = serve_clients(json_listener, nmea_listener, registry, store, broadcast_tx, stdout_tx) => {}
        () = shutdown_signal() => {
            info!("n2kd shutting down");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Runs the two accept loops until one of the listeners is dropped. Split
/// out from [`run`] so integration tests can drive real client sockets
/// against a [`StoreActor`] they control directly, without going through
/// the real process stdin (whose EOF is fatal — see [`spawn_stdin_reader`]).
pub async fn serve_clients(
    json_listener: TcpListener,
    nmea_listener: TcpListener,
    registry: Arc<Registry>,
    store: StoreHandle,
    broadcast_tx: BroadcastHandle,
    stdout_tx: mpsc::Sender<String>,
) {
    tokio::select! {
        () = accept_json_loop(json_listener, Arc::clone(&registry), store, broadcast_tx, stdout_tx) => {}
        () = accept_nmea_loop(nmea_listener, registry) => {}
    }
}

async fn bind_listener(port: u16, kind: &'static str) -> Result<TcpListener, N2kdError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    TcpListener::bind(addr)
        .await
        .map_err(|source| N2kdError::Bind { kind, addr, source })
}

/// Reads stdin byte by byte through a [`LineReassembler`] and forwards every
/// reassembled record to the store actor (§4.2). Stdin closing or failing is
/// fatal (§7, and the Design Notes' "stdin fatal-on-EOF" open question): the
/// analyzer is a required live producer, so there is no standalone mode.
pub fn spawn_stdin_reader(store: StoreHandle) {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut reassembler = LineReassembler::new();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    error!("stdin closed (analyzer exited); aborting");
                    std::process::exit(EXIT_FATAL);
                }
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if let Some(line) = reassembler.feed(byte) {
                            let text = String::from_utf8_lossy(&line).into_owned();
                            if store.send(StoreCommand::Ingest(text)).await.is_err() {
                                error!("store actor gone; aborting");
                                std::process::exit(EXIT_FATAL);
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    std::process::exit(EXIT_FATAL);
                }
            }
        }
    });
}

/// One line handed to the stdout writer by a client connection handler
/// (§4.4): the client's first line, when not a `-\n` upgrade.
enum StdoutInput {
    Broadcast(Arc<str>),
    ClientLine(String),
}

/// Owns the real stdout descriptor (§3 `STDOUT_STREAM`). In `PassThrough`
/// and `Copy` mode it mirrors every record the store actor broadcasts
/// (§4.1 write phase); in `Copy` mode it additionally feeds lines injected
/// by clients back into the store, and in every non-`Sink` mode it mirrors
/// a client's first non-upgrade line (§4.4). `Sink` mode discards both.
/// A write failure on the real stdout descriptor is fatal (§7).
pub fn spawn_stdout_writer(
    mode: StdoutMode,
    mut broadcast_rx: broadcast::Receiver<Arc<str>>,
    store: StoreHandle,
) -> mpsc::Sender<String> {
    let (tx, mut client_lines) = mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let input = tokio::select! {
                msg = broadcast_rx.recv() => match msg {
                    Ok(line) => StdoutInput::Broadcast(line),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "stdout writer lagged behind broadcast");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(line) = client_lines.recv() => StdoutInput::ClientLine(line),
            };
            match (mode, input) {
                (StdoutMode::Sink, _) => {}
                (_, StdoutInput::Broadcast(line)) => {
                    if stdout.write_all(line.as_bytes()).await.is_err() {
                        error!("failed to write stdout");
                        std::process::exit(EXIT_FATAL);
                    }
                }
                (StdoutMode::PassThrough, StdoutInput::ClientLine(line)) => {
                    if write_line(&mut stdout, &line).await.is_err() {
                        error!("failed to write stdout");
                        std::process::exit(EXIT_FATAL);
                    }
                }
                (StdoutMode::Copy, StdoutInput::ClientLine(line)) => {
                    if write_line(&mut stdout, &line).await.is_err() {
                        error!("failed to write stdout");
                        std::process::exit(EXIT_FATAL);
                    }
                    let _ = store.send(StoreCommand::Ingest(line)).await;
                }
            }
        }
    });
    tx
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await
}

async fn accept_json_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    store: StoreHandle,
    broadcast_tx: BroadcastHandle,
    stdout_tx: mpsc::Sender<String>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let Some(guard) = registry.try_acquire() else {
                    warn!(%peer, "client table full, dropping json connection");
                    continue;
                };
                info!(%peer, kind = "json_oneshot", "client connected");
                let store = store.clone();
                let broadcast_tx = broadcast_tx.clone();
                let stdout_tx = stdout_tx.clone();
                tokio::spawn(async move {
                    handle_json_client(stream, peer, store, broadcast_tx, stdout_tx, guard).await;
                });
            }
            Err(e) => warn!(error = %e, "accept failed on json listener"),
        }
    }
}

async fn accept_nmea_loop(listener: TcpListener, registry: Arc<Registry>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let Some(guard) = registry.try_acquire() else {
                    warn!(%peer, "client table full, dropping nmea0183 connection");
                    continue;
                };
                info!(%peer, kind = "nmea0183_stream", "client connected");
                tokio::spawn(async move {
                    handle_nmea_client(stream, peer, guard).await;
                });
            }
            Err(e) => warn!(error = %e, "accept failed on nmea0183 listener"),
        }
    }
}

/// Drive one accepted JSON client (§4.1 step 2, §4.4 kind transition):
/// `JSON_ONESHOT` until either its 500 ms deadline elapses (deliver one
/// snapshot and close) or it sends a line ending in `-` (upgrade to
/// `JSON_STREAM` and mirror every broadcast record until it disconnects).
async fn handle_json_client(
    stream: TcpStream,
    peer: SocketAddr,
    store: StoreHandle,
    broadcast_tx: BroadcastHandle,
    stdout_tx: mpsc::Sender<String>,
    _guard: ClientGuard,
) {
    let (mut reader, writer) = stream.into_split();
    let mut reassembler = LineReassembler::new();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::sleep(ONESHOT_DEADLINE);
    tokio::pin!(deadline);
    let mut upgraded = false;

    'wait: loop {
        tokio::select! {
            () = &mut deadline, if !upgraded => break 'wait,
            res = reader.read(&mut buf) => {
                match res {
                    Ok(0) => {
                        debug!(%peer, "json client disconnected before snapshot deadline");
                        return;
                    }
                    Ok(n) => {
                        for &byte in &buf[..n] {
                            if let Some(line) = reassembler.feed(byte) {
                                let text = String::from_utf8_lossy(&line).into_owned();
                                if text.ends_with('-') {
                                    upgraded = true;
                                    break;
                                }
                                // §4.4: forward the line to stdout; the writer
                                // task itself honors `Sink`/`Copy`/`PassThrough`.
                                let _ = stdout_tx.send(text).await;
                            }
                        }
                        if upgraded {
                            break 'wait;
                        }
                    }
                    Err(e) => {
                        warn!(%peer, error = %e, "read error on json client");
                        return;
                    }
                }
            }
        }
    }

    if upgraded {
        info!(%peer, kind = "json_stream", "client upgraded to streaming");
        stream_broadcast_to_client(writer, broadcast_tx.subscribe(), peer).await;
    } else {
        send_snapshot_and_close(writer, &store, peer).await;
    }
}

async fn send_snapshot_and_close(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    store: &StoreHandle,
    peer: SocketAddr,
) {
    let (tx, rx) = oneshot::channel();
    if store.send(StoreCommand::Snapshot(tx)).await.is_err() {
        warn!(%peer, "store actor gone, closing one-shot client");
        return;
    }
    let snapshot = match rx.await {
        Ok(s) => s,
        Err(_) => {
            warn!(%peer, "snapshot reply dropped, closing one-shot client");
            return;
        }
    };
    if let Err(e) = writer.write_all(snapshot.as_bytes()).await {
        warn!(%peer, error = %e, "short write delivering snapshot");
    }
    let _ = writer.shutdown().await;
}

async fn stream_broadcast_to_client(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut rx: broadcast::Receiver<Arc<str>>,
    peer: SocketAddr,
) {
    loop {
        match rx.recv().await {
            Ok(line) => {
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    warn!(%peer, error = %e, "short write to streaming client, closing");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(%peer, skipped, "streaming client lagged, skipping");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Accept only (§3 `NMEA0183_STREAM`): the wire protocol belongs to the
/// sibling 0183 translator. This handler's only job is to hold the slot
/// open and notice disconnection.
async fn handle_nmea_client(mut stream: TcpStream, peer: SocketAddr, _guard: ClientGuard) {
    let mut scratch = [0u8; 256];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) => {
                debug!(%peer, "nmea0183 client disconnected");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%peer, error = %e, "read error on nmea0183 client");
                return;
            }
        }
    }
}
