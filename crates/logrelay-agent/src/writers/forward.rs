//! Relay writer: forwards each record to another logrelay instance.
//!
//! The destination scheme picks the transport once, at construction:
//! `udp://` sends one fire-and-forget datagram per record, `tcp://` speaks
//! the JSON-lines stream protocol and waits for a [`LogResult`], and
//! `http(s)://` POSTs to the peer's `/api/log` endpoint. Every transport
//! failure, including a non-200 status embedded in the peer's reply,
//! surfaces as a [`WriteError`] and feeds the dispatch engine's retry
//! decision.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use crate::config::ForwardWriterConfig;
use crate::error::{ConfigError, WriteError};
use crate::record::SEPARATOR;
use crate::wire::{LogMessage, LogResult};
use crate::writers::{LogWriter, WriterInfo};

/// Bound on how long a single forwarded write may block.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_RESULT_LINE: usize = 64 * 1024;

#[derive(Debug)]
enum Transport {
    Udp { socket: UdpSocket, target: String },
    Tcp { target: String },
    Http { base: String, client: reqwest::Client },
}

#[derive(Debug)]
pub struct ForwardWriter {
    category: String,
    retry_seconds: Option<i64>,
    transport: Transport,
}

impl ForwardWriter {
    pub async fn new(category: &str, config: &ForwardWriterConfig) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidWriter {
            category: category.to_string(),
            reason,
        };

        let destination = config.destination.trim();
        if destination.is_empty() {
            return Err(invalid("no [destination] configuration defined".into()));
        }
        let (scheme, host) = destination
            .split_once("://")
            .ok_or_else(|| invalid(format!("cannot parse destination [{destination}]")))?;
        if host.is_empty() {
            return Err(invalid(format!("cannot parse destination [{destination}]")));
        }

        let transport = match scheme {
            "udp" => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(|e| invalid(format!("cannot bind datagram socket: {e}")))?;
                Transport::Udp {
                    socket,
                    target: host.to_string(),
                }
            }
            "tcp" => Transport::Tcp {
                target: host.to_string(),
            },
            "http" | "https" => {
                let client = reqwest::Client::builder()
                    .timeout(FORWARD_TIMEOUT)
                    .build()
                    .map_err(|e| invalid(format!("cannot build http client: {e}")))?;
                Transport::Http {
                    base: destination.trim_end_matches('/').to_string(),
                    client,
                }
            }
            other => {
                return Err(invalid(format!(
                    "unsupported destination scheme [{other}]"
                )))
            }
        };

        debug!("initialized forward log writer for category [{category}] -> [{destination}]");
        Ok(Self {
            category: category.to_string(),
            retry_seconds: config.retry_seconds,
            transport,
        })
    }

    async fn write_udp(
        socket: &UdpSocket,
        target: &str,
        category: &str,
        message: &str,
    ) -> Result<(), WriteError> {
        let mut datagram = Vec::with_capacity(category.len() + 1 + message.len());
        datagram.extend_from_slice(category.as_bytes());
        datagram.push(SEPARATOR as u8);
        datagram.extend_from_slice(message.as_bytes());
        socket.send_to(&datagram, target).await?;
        Ok(())
    }

    async fn write_tcp(target: &str, category: &str, message: &str) -> Result<(), WriteError> {
        let stream = TcpStream::connect(target).await?;
        let mut framed = Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_RESULT_LINE),
        );

        let frame = serde_json::to_string(&LogMessage {
            category: category.to_string(),
            message: message.to_string(),
        })
        .map_err(|e| WriteError::Transport(e.to_string()))?;
        framed
            .send(frame)
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))?;
        // Half-close the write side so the peer sees end-of-stream and
        // answers with its aggregate result.
        framed.get_mut().shutdown().await?;

        let line = match framed.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(WriteError::Transport(e.to_string())),
            None => {
                return Err(WriteError::InvalidResponse(
                    "connection closed without a result".into(),
                ))
            }
        };
        let result: LogResult = serde_json::from_str(&line)
            .map_err(|e| WriteError::InvalidResponse(e.to_string()))?;
        if result.status != 200 {
            return Err(WriteError::RemoteStatus(result.status));
        }
        Ok(())
    }

    async fn write_http(
        client: &reqwest::Client,
        base: &str,
        category: &str,
        message: &str,
    ) -> Result<(), WriteError> {
        let url = format!("{base}/api/log");
        let response = client
            .post(&url)
            .json(&LogMessage {
                category: category.to_string(),
                message: message.to_string(),
            })
            .send()
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::RemoteStatus(status.as_u16()));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WriteError::InvalidResponse(e.to_string()))?;
        match body.get("status").and_then(serde_json::Value::as_i64) {
            Some(200) => Ok(()),
            Some(other) => Err(WriteError::RemoteStatus(
                u16::try_from(other).unwrap_or(500),
            )),
            None => Err(WriteError::InvalidResponse(
                "response body has no status field".into(),
            )),
        }
    }
}

#[async_trait]
impl LogWriter for ForwardWriter {
    fn info(&self) -> WriterInfo {
        WriterInfo {
            name: "forward",
            description: "forwards log messages to another logrelay instance",
            retry_seconds: self.retry_seconds,
        }
    }

    async fn write(&self, category: &str, message: &str) -> Result<(), WriteError> {
        let delivery = async {
            match &self.transport {
                Transport::Udp { socket, target } => {
                    Self::write_udp(socket, target, category, message).await
                }
                Transport::Tcp { target } => Self::write_tcp(target, category, message).await,
                // reqwest enforces its own FORWARD_TIMEOUT per request.
                Transport::Http { base, client } => {
                    Self::write_http(client, base, category, message).await
                }
            }
        };
        match timeout(FORWARD_TIMEOUT, delivery).await {
            Ok(result) => result,
            Err(_) => Err(WriteError::Transport(format!(
                "forwarding from [{}] timed out after {}s",
                self.category,
                FORWARD_TIMEOUT.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_config(destination: &str) -> ForwardWriterConfig {
        ForwardWriterConfig {
            destination: destination.to_string(),
            retry_seconds: Some(-1),
        }
    }

    #[tokio::test]
    async fn rejects_unsupported_and_unparsable_destinations() {
        for destination in ["", "grpc://10.0.0.1:9090", "not a url"] {
            let err = ForwardWriter::new("app", &forward_config(destination))
                .await
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidWriter { .. }), "{destination}");
        }
    }

    #[tokio::test]
    async fn udp_transport_sends_tab_separated_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let writer = ForwardWriter::new("app", &forward_config(&format!("udp://{addr}")))
            .await
            .unwrap();
        writer.write("app", "over the wire").await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"app\tover the wire");
    }

    async fn tcp_peer_answering(status: u16) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, LinesCodec::new());
            let line = framed.next().await.unwrap().unwrap();
            let message: LogMessage = serde_json::from_str(&line).unwrap();
            assert_eq!(message.category, "app");
            let result = LogResult {
                status,
                num_success: u64::from(status == 200),
                message: String::new(),
            };
            framed
                .send(serde_json::to_string(&result).unwrap())
                .await
                .unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn tcp_transport_accepts_a_200_result() {
        let addr = tcp_peer_answering(200).await;
        let writer = ForwardWriter::new("app", &forward_config(&format!("tcp://{addr}")))
            .await
            .unwrap();
        writer.write("app", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn tcp_transport_surfaces_non_200_results() {
        let addr = tcp_peer_answering(500).await;
        let writer = ForwardWriter::new("app", &forward_config(&format!("tcp://{addr}")))
            .await
            .unwrap();
        let err = writer.write("app", "hello").await.unwrap_err();
        assert!(matches!(err, WriteError::RemoteStatus(500)));
    }

    #[tokio::test]
    async fn tcp_transport_surfaces_connection_errors() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let writer = ForwardWriter::new("app", &forward_config(&format!("tcp://{addr}")))
            .await
            .unwrap();
        let err = writer.write("app", "hello").await.unwrap_err();
        assert!(matches!(
            err,
            WriteError::Io(_) | WriteError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn http_transport_accepts_embedded_200() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/log")
            .with_status(200)
            .with_body(r#"{"status":200}"#)
            .create_async()
            .await;

        let writer = ForwardWriter::new("app", &forward_config(&server.url()))
            .await
            .unwrap();
        writer.write("app", "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_transport_rejects_embedded_failure_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/log")
            .with_status(200)
            .with_body(r#"{"status":500,"message":"downstream busted"}"#)
            .create_async()
            .await;

        let writer = ForwardWriter::new("app", &forward_config(&server.url()))
            .await
            .unwrap();
        let err = writer.write("app", "hello").await.unwrap_err();
        assert!(matches!(err, WriteError::RemoteStatus(500)));
    }

    #[tokio::test]
    async fn http_transport_rejects_non_2xx_transport_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/log")
            .with_status(503)
            .create_async()
            .await;

        let writer = ForwardWriter::new("app", &forward_config(&server.url()))
            .await
            .unwrap();
        let err = writer.write("app", "hello").await.unwrap_err();
        assert!(matches!(err, WriteError::RemoteStatus(503)));
    }
}
