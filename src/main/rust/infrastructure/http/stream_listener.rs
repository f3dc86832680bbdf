use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::detach;
use crate::application::services::ClientFanout;
use crate::domain::ports::MetricsReporter;

/// Upper bound for the request line plus headers
const MAX_HEAD_BYTES: u64 = 8 * 1024;

/// Time a client gets to send its request head
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after an accept failure that is not tied to a single connection
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
}

/// Accepts live-stream requests and hands them to the fan-out.
///
/// This is the only HTTP the stream port speaks: one request head, then
/// either a short error response or the raw pipeline output forever.
pub struct StreamListener {
    fanout: Arc<ClientFanout>,
    mount: String,
    metrics: Arc<dyn MetricsReporter>,
}

impl StreamListener {
    pub fn new(
        fanout: Arc<ClientFanout>,
        mount: impl Into<String>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            fanout,
            mount: mount.into(),
            metrics,
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Accept loop; each connection runs on its own task
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept stream connection: {}", e);
                    if let Some(delay) = accept_backoff(&e) {
                        // e.g. EMFILE while every viewer holds a descriptor
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    pub async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let head = match tokio::time::timeout(HEAD_TIMEOUT, read_request_head(&mut stream)).await
        {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                tracing::debug!(peer = %peer, "Malformed stream request: {}", e);
                respond(&mut stream, "400 Bad Request", "malformed request").await;
                return;
            }
            Err(_) => {
                tracing::debug!(peer = %peer, "Timed out waiting for request head");
                return;
            }
        };

        tracing::info!(peer = %peer, method = %head.method, path = %head.path, "Stream request");

        if head.method != "GET" {
            respond(&mut stream, "405 Method Not Allowed", "method not allowed").await;
            return;
        }
        if head.path != self.mount {
            respond(&mut stream, "404 Not Found", "not found").await;
            return;
        }

        // Checked before anything is duplicated, so a rejection leaks nothing
        let Some(pipeline) = self.fanout.current_pipeline() else {
            self.metrics.report_client_rejected();
            respond(&mut stream, "404 Not Found", "no active source").await;
            return;
        };

        let connection = match detach(stream) {
            Ok(connection) => connection,
            Err(e) => {
                self.metrics.report_client_rejected();
                tracing::warn!(peer = %peer, "Connection takeover failed: {}", e);
                return;
            }
        };

        let fanout = self.fanout.clone();
        let attached =
            tokio::task::spawn_blocking(move || fanout.attach(Box::new(connection), pipeline))
                .await;

        match attached {
            Ok(Ok(fd)) => tracing::debug!(peer = %peer, fd, "Stream handed to pipeline"),
            Ok(Err(e)) => {
                self.metrics.report_client_rejected();
                tracing::warn!(peer = %peer, "Live stream request abandoned: {}", e);
            }
            Err(e) => {
                self.metrics.report_client_rejected();
                tracing::error!(peer = %peer, "Attach task failed: {}", e);
            }
        }
    }
}

/// Binds `addr` and serves live-stream requests until the task is dropped
pub async fn serve_stream(addr: SocketAddr, listener: Arc<StreamListener>) -> io::Result<()> {
    let tcp = TcpListener::bind(addr).await?;
    tracing::info!(
        "Live stream listening on http://{}{}",
        tcp.local_addr()?,
        listener.mount()
    );
    listener.run(tcp).await;
    Ok(())
}

/// Failures of one pending connection are retried at once, anything else
/// (descriptor or memory exhaustion) waits a little first.
fn accept_backoff(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

async fn read_request_head(stream: &mut TcpStream) -> io::Result<RequestHead> {
    let mut reader = BufReader::new(stream.take(MAX_HEAD_BYTES));

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty request"));
    }
    let head = parse_request_line(&request_line)?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "request head truncated",
            ));
        }
        if line == "\r\n" || line == "\n" {
            return Ok(head);
        }
    }
}

fn parse_request_line(line: &str) -> io::Result<RequestHead> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("request line must have three parts"));
    };
    if !version.starts_with("HTTP/") {
        return Err(invalid("unsupported protocol"));
    }
    if !target.starts_with('/') {
        return Err(invalid("request target must be a path"));
    }

    let path = target.split('?').next().unwrap_or(target);
    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
    })
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!("Failed to write error response: {}", e);
    }
    let _ = stream.shutdown().await;
}
