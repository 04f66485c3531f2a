//! The NMEA 0183 listener (§3 `NMEA0183_STREAM`, §6): accept only, wire
//! protocol owned by the out-of-scope translator. This spec guarantees the
//! connection is accepted and held open until the client disconnects.

use std::time::Duration;

use n2kd::cli::StdoutMode;
use n2kd::registry::Registry;
use n2kd::server::serve_clients;
use n2kd::store_actor::StoreActor;
use tokio::net::{TcpListener, TcpStream};

async fn spawn_test_server() -> (std::net::SocketAddr, std::net::SocketAddr) {
    let (store, broadcast_tx) = StoreActor::spawn();
    let registry = Registry::new();
    let json_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let nmea_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let json_addr = json_listener.local_addr().unwrap();
    let nmea_addr = nmea_listener.local_addr().unwrap();
    let stdout_tx = n2kd::server::spawn_stdout_writer(
        StdoutMode::Sink,
        broadcast_tx.subscribe(),
        store.clone(),
    );
    tokio::spawn(serve_clients(
        json_listener,
        nmea_listener,
        registry,
        store,
        broadcast_tx,
        stdout_tx,
    ));
    (json_addr, nmea_addr)
}

#[tokio::test]
async fn nmea_listener_accepts_and_holds_connection_open() {
    let (_json_addr, nmea_addr) = spawn_test_server().await;
    let client = TcpStream::connect(nmea_addr).await.unwrap();

    // No bytes ever arrive (the translator that would write them is out of
    // scope); the connection simply stays open rather than being reset.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.peer_addr().is_ok(), "connection should remain open");
}

#[tokio::test]
async fn nmea_listener_notices_client_disconnect() {
    let (_json_addr, nmea_addr) = spawn_test_server().await;
    let client = TcpStream::connect(nmea_addr).await.unwrap();
    drop(client);

    // A second connection still succeeds, proving the listener's accept
    // loop survived the first client's disconnect.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = TcpStream::connect(nmea_addr).await;
    assert!(second.is_ok());
}
