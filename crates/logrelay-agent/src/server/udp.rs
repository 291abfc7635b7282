//! UDP listener: one `category<TAB>message` record per datagram.
//!
//! Fire and forget; nothing is ever sent back. Malformed datagrams and
//! rejected submissions are logged and dropped. Several workers share the
//! socket so a slow enqueue cannot back up the receive buffer.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ingest::Ingestor;
use crate::record::SEPARATOR;

const BUFFER_SIZE: usize = 8192;

pub(super) async fn serve(socket: Arc<UdpSocket>, ingestor: Ingestor, cancel: CancellationToken) {
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("udp listener stopping");
                return;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _)) => handle_datagram(&buf[..len], &ingestor),
                Err(e) => warn!("udp receive error: {e}"),
            },
        }
    }
}

fn handle_datagram(payload: &[u8], ingestor: &Ingestor) {
    let Ok(text) = std::str::from_utf8(payload) else {
        warn!("dropping non-utf8 datagram ({} bytes)", payload.len());
        return;
    };
    let Some((category, message)) = text.split_once(SEPARATOR) else {
        warn!("dropping datagram without a category separator");
        return;
    };
    if let Err(e) = ingestor.submit(category, message) {
        warn!("dropping datagram: {e}");
    }
}
