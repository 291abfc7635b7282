//! Streaming TCP listener: newline-delimited JSON [`LogMessage`] frames.
//!
//! A producer connects, streams any number of frames, then half-closes its
//! write side. The listener enqueues each frame as it arrives and answers
//! with exactly one [`LogResult`] carrying the count of accepted records.
//! The first malformed frame or queue failure short-circuits the stream:
//! the result is sent immediately and the connection is closed, so the
//! producer can tell how many of its records made it in.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::IngestError;
use crate::ingest::Ingestor;
use crate::wire::{LogMessage, LogResult};

const MAX_FRAME_LENGTH: usize = 1024 * 1024;

pub(super) async fn serve(listener: TcpListener, ingestor: Ingestor, cancel: CancellationToken) {
    loop {
        let stream = tokio::select! {
            () = cancel.cancelled() => {
                debug!("tcp listener stopping");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!("tcp accept error: {e}");
                    continue;
                }
            },
        };

        let ingestor = ingestor.clone();
        tokio::spawn(async move {
            handle_stream(stream, &ingestor).await;
        });
    }
}

async fn handle_stream<S>(stream: S, ingestor: &Ingestor)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));
    let mut num_success: u64 = 0;

    let result = loop {
        let line = match framed.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => break LogResult::bad_request(num_success, e.to_string()),
            None => break LogResult::ok(num_success),
        };
        if line.trim().is_empty() {
            continue;
        }
        let message: LogMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                break LogResult::bad_request(
                    num_success,
                    format!("cannot parse log message: {e}"),
                )
            }
        };
        match ingestor.submit(&message.category, &message.message) {
            Ok(_) => num_success += 1,
            Err(e @ IngestError::Queue(_)) => break LogResult::internal(num_success, e.to_string()),
            Err(e) => break LogResult::bad_request(num_success, e.to_string()),
        }
    };

    match serde_json::to_string(&result) {
        Ok(frame) => {
            if let Err(e) = framed.send(frame).await {
                warn!("error sending stream result: {e}");
            }
        }
        Err(e) => warn!("error encoding stream result: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_queue::{LogQueue, MemoryQueue};
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    fn ingestor() -> (Arc<MemoryQueue>, Ingestor) {
        let queue = Arc::new(MemoryQueue::new());
        let ingestor = Ingestor::new(Arc::clone(&queue) as Arc<dyn LogQueue>);
        (queue, ingestor)
    }

    async fn run_stream(input: &[u8]) -> (Arc<MemoryQueue>, LogResult) {
        let (queue, ingestor) = ingestor();
        let (mut client, server) = tokio::io::duplex(64 * 1024);

        let handler = tokio::spawn(async move {
            handle_stream(server, &ingestor).await;
        });

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let mut framed = Framed::new(client, LinesCodec::new());
        let line = framed.next().await.unwrap().unwrap();
        let result: LogResult = serde_json::from_str(&line).unwrap();
        handler.await.unwrap();
        (queue, result)
    }

    #[tokio::test]
    async fn counts_every_accepted_frame() {
        let (queue, result) = run_stream(
            b"{\"category\":\"app\",\"message\":\"one\"}\n\
              {\"category\":\"app\",\"message\":\"two\"}\n\
              {\"category\":\"audit\",\"message\":\"three\"}\n",
        )
        .await;
        assert_eq!(result.status, 200);
        assert_eq!(result.num_success, 3);
        assert_eq!(queue.pending_len(), 3);
    }

    #[tokio::test]
    async fn empty_stream_answers_zero_successes() {
        let (queue, result) = run_stream(b"").await;
        assert_eq!(result.status, 200);
        assert_eq!(result.num_success, 0);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn malformed_frame_short_circuits_with_400() {
        let (queue, result) = run_stream(
            b"{\"category\":\"app\",\"message\":\"good\"}\n\
              this is not json\n\
              {\"category\":\"app\",\"message\":\"never read\"}\n",
        )
        .await;
        assert_eq!(result.status, 400);
        assert_eq!(result.num_success, 1);
        // Only the frames before the malformed one were enqueued.
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (queue, result) = run_stream(
            b"\n{\"category\":\"app\",\"message\":\"only\"}\n\n",
        )
        .await;
        assert_eq!(result.status, 200);
        assert_eq!(result.num_success, 1);
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn invalid_record_short_circuits_with_400() {
        let (_queue, result) = run_stream(
            b"{\"category\":\"  \",\"message\":\"blank category\"}\n",
        )
        .await;
        assert_eq!(result.status, 400);
        assert_eq!(result.num_success, 0);
    }
}
