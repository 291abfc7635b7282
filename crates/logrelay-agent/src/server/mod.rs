//! Producer-facing listeners.
//!
//! Three independent front doors feed the same ingestion gate: an HTTP
//! endpoint, a fire-and-forget UDP socket, and a streaming JSON-lines TCP
//! listener. Each is enabled by giving it a non-zero port. Listeners never
//! touch writers or the dispatch engine; they validate, enqueue and answer.

use std::io;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::ingest::Ingestor;

mod http;
mod stream;
mod udp;

/// Binds every enabled listener and spawns its accept loop. Returns the
/// spawned handles so the caller can await them on shutdown. Bind failures
/// are fatal; a half-listening agent silently loses records.
pub async fn start(
    config: &ServerConfig,
    ingestor: Ingestor,
    cancel: CancellationToken,
) -> io::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();

    if config.http.enabled() {
        let listener = TcpListener::bind(config.http.bind_addr()).await?;
        info!("http listener on {}", config.http.bind_addr());
        let ingestor = ingestor.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            http::serve(listener, ingestor, cancel).await;
        }));
    }

    if config.udp.enabled() {
        let socket = Arc::new(UdpSocket::bind(config.udp.bind_addr()).await?);
        info!(
            "udp listener on {} with {} worker(s)",
            config.udp.bind_addr(),
            config.udp.workers()
        );
        for _ in 0..config.udp.workers() {
            let socket = Arc::clone(&socket);
            let ingestor = ingestor.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                udp::serve(socket, ingestor, cancel).await;
            }));
        }
    }

    if config.tcp.enabled() {
        let listener = TcpListener::bind(config.tcp.bind_addr()).await?;
        info!("tcp listener on {}", config.tcp.bind_addr());
        handles.push(tokio::spawn(async move {
            stream::serve(listener, ingestor, cancel).await;
        }));
    }

    Ok(handles)
}
