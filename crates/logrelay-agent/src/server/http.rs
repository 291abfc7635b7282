//! HTTP listener: `POST`/`PUT /api/log` with a JSON body.
//!
//! The body carries one record using either the canonical keys
//! (`category`/`message`) or the legacy shorthands (`cat`/`c`, `msg`/`m`).
//! The reply is always a [`LogResult`] body whose `status` field matches the
//! HTTP status code.

use std::convert::Infallible;
use std::io;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::IngestError;
use crate::ingest::Ingestor;
use crate::wire::{extract_field, LogResult};

pub(super) async fn serve(listener: TcpListener, ingestor: Ingestor, cancel: CancellationToken) {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = JoinSet::new();

    loop {
        let conn = tokio::select! {
            () = cancel.cancelled() => {
                debug!("http listener stopping");
                while joinset.join_next().await.is_some() {}
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((conn, _)) => conn,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("http accept error: {e}");
                    continue;
                }
            },
        };

        let conn = TokioIo::new(conn);
        let server = server.clone();
        let ingestor = ingestor.clone();
        joinset.spawn(async move {
            let service = service_fn(move |req| {
                let ingestor = ingestor.clone();
                async move { handle_request(req, &ingestor).await }
            });
            if let Err(e) = server.serve_connection(conn, service).await {
                debug!("http connection error: {e}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    ingestor: &Ingestor,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let result = match (req.method(), req.uri().path()) {
        (&Method::POST | &Method::PUT, "/api/log") => match req.into_body().collect().await {
            Ok(body) => handle_log_body(&body.to_bytes(), ingestor),
            Err(e) => LogResult::bad_request(0, format!("cannot read request body: {e}")),
        },
        _ => {
            let mut not_found = Response::new(Full::new(Bytes::new()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            return Ok(not_found);
        }
    };
    Ok(to_response(&result))
}

/// Parses and submits one record, mapping every outcome to a [`LogResult`].
fn handle_log_body(body: &[u8], ingestor: &Ingestor) -> LogResult {
    let parsed: serde_json::Value = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(e) => return LogResult::bad_request(0, format!("cannot parse request body: {e}")),
    };
    let Some(category) = extract_field(&parsed, &["category", "cat", "c"]) else {
        return LogResult::bad_request(0, "missing parameter [category]");
    };
    let Some(message) = extract_field(&parsed, &["message", "msg", "m"]) else {
        return LogResult::bad_request(0, "missing parameter [message]");
    };
    match ingestor.submit(&category, &message) {
        Ok(_) => LogResult::ok(1),
        Err(e @ IngestError::Queue(_)) => LogResult::internal(0, e.to_string()),
        Err(e) => LogResult::bad_request(0, e.to_string()),
    }
}

fn to_response(result: &LogResult) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(result).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() =
        StatusCode::from_u16(result.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Ok(value) = "application/json".parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}
