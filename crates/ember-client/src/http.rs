//! Minimal HTTP/1.1 channel over one TCP connection.
//!
//! The server speaks a deliberately tiny HTTP subset: POST `/` for the key
//! exchange, GET `/size` for the manifest, GET `/stream` for sequential
//! fraction delivery, GET per-locator otherwise. Responses are framed by
//! Content-Length only — no chunked encoding, no redirects, one connection
//! kept alive for the whole run.
//!
//! Every request is wrapped in a timeout so a hung server fails the run
//! instead of wedging it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::channel::{ChannelError, Manifest, ServerChannel};

/// Upper bound on a single response body. Fractions are small; anything
/// bigger than this is a misbehaving or malicious server.
const MAX_BODY: usize = 16 * 1024 * 1024;

/// Upper bound on the status line and headers of one response, combined.
/// The server only ever needs a status line and a Content-Length header.
const MAX_HEAD: usize = 8 * 1024;

pub struct HttpChannel {
    reader: BufReader<TcpStream>,
    host: String,
    /// Per-request deadline. Zero disables the timeout.
    timeout: Duration,
}

impl HttpChannel {
    /// Connect to the server. The same connection carries every request of
    /// the run.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let connect = TcpStream::connect((host, port));
        let stream = if timeout.is_zero() {
            connect.await?
        } else {
            tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| ChannelError::Timeout(timeout))??
        };
        tracing::debug!(host, port, "connected to fraction server");
        Ok(Self {
            reader: BufReader::new(stream),
            host: host.to_string(),
            timeout,
        })
    }

    async fn request(
        &mut self,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<Bytes, ChannelError> {
        let deadline = self.timeout;
        if deadline.is_zero() {
            self.request_inner(method, path, body).await
        } else {
            tokio::time::timeout(deadline, self.request_inner(method, path, body))
                .await
                .map_err(|_| ChannelError::Timeout(deadline))?
        }
    }

    async fn request_inner(
        &mut self,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<Bytes, ChannelError> {
        let mut head = format!(
            "{method} {path} HTTP/1.1\r\nHost: {}\r\nConnection: keep-alive\r\n",
            self.host
        );
        if !body.is_empty() {
            head.push_str(&format!(
                "Content-Type: application/octet-stream\r\nContent-Length: {}\r\n",
                body.len()
            ));
        }
        head.push_str("\r\n");

        let stream = self.reader.get_mut();
        stream.write_all(head.as_bytes()).await?;
        if !body.is_empty() {
            stream.write_all(body).await?;
        }
        stream.flush().await?;

        // Status line
        let mut head_budget = MAX_HEAD as u64;
        let mut line = String::new();
        self.read_head_line(&mut line, &mut head_budget).await?;
        if line.is_empty() {
            return Err(ChannelError::Protocol("connection closed by server".into()));
        }
        let status: u16 = line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| ChannelError::Protocol(format!("bad status line: {line:?}")))?;

        // Headers — only Content-Length matters.
        let mut content_length: Option<usize> = None;
        loop {
            self.read_head_line(&mut line, &mut head_budget).await?;
            if line.is_empty() {
                return Err(ChannelError::Protocol("truncated response headers".into()));
            }
            if line == "\r\n" || line == "\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().ok();
                }
            }
        }

        if status != 200 {
            // Drain the error body so the next request on this connection
            // does not read stale bytes as its status line.
            if let Some(length) = content_length {
                self.discard_body(length).await?;
            }
            return Err(ChannelError::Status(status));
        }

        let length = content_length
            .ok_or_else(|| ChannelError::Protocol("response has no Content-Length".into()))?;
        if length > MAX_BODY {
            return Err(ChannelError::Protocol(format!(
                "response body of {length} bytes exceeds the {MAX_BODY} byte limit"
            )));
        }

        let mut payload = vec![0u8; length];
        self.reader.read_exact(&mut payload).await?;
        Ok(Bytes::from(payload))
    }

    /// Read one head line, charged against the remaining head budget. A line
    /// that would overrun the budget is a protocol error, so a server
    /// streaming an endless header cannot grow the buffer past `MAX_HEAD`.
    async fn read_head_line(
        &mut self,
        line: &mut String,
        budget: &mut u64,
    ) -> Result<(), ChannelError> {
        line.clear();
        let mut limited = (&mut self.reader).take(*budget);
        let n = limited.read_line(line).await?;
        *budget -= n as u64;
        if *budget == 0 && !line.ends_with('\n') {
            return Err(ChannelError::Protocol(format!(
                "response head exceeds {MAX_HEAD} bytes"
            )));
        }
        Ok(())
    }

    /// Read and discard a response body in fixed-size chunks.
    async fn discard_body(&mut self, length: usize) -> Result<(), ChannelError> {
        let mut remaining = length;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let want = remaining.min(scratch.len());
            let n = self.reader.read(&mut scratch[..want]).await?;
            if n == 0 {
                break;
            }
            remaining -= n;
        }
        Ok(())
    }

    fn utf8(body: Bytes, what: &str) -> Result<String, ChannelError> {
        String::from_utf8(body.to_vec())
            .map_err(|_| ChannelError::Protocol(format!("{what} is not valid UTF-8")))
    }
}

#[async_trait]
impl ServerChannel for HttpChannel {
    async fn negotiate_key(&mut self, public_key_pem: &str) -> Result<String, ChannelError> {
        let body = self.request("POST", "/", public_key_pem.as_bytes()).await?;
        Ok(Self::utf8(body, "key response")?.trim().to_string())
    }

    async fn manifest(&mut self) -> Result<Manifest, ChannelError> {
        let body = self.request("GET", "/size", &[]).await?;
        Manifest::parse(&Self::utf8(body, "manifest response")?)
    }

    async fn next_fraction(&mut self) -> Result<Bytes, ChannelError> {
        self.request("GET", "/stream", &[]).await
    }

    async fn fraction_at(&mut self, locator: &str) -> Result<Bytes, ChannelError> {
        if locator.starts_with('/') {
            self.request("GET", locator, &[]).await
        } else {
            let path = format!("/{locator}");
            self.request("GET", &path, &[]).await
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
