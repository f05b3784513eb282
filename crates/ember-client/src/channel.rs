//! Server channel boundary.
//!
//! The pipeline never touches sockets or request framing directly; it issues
//! the four logical exchanges below against whatever implements
//! [`ServerChannel`]. Production uses [`crate::HttpChannel`]; tests use
//! in-memory channels.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// The request/response surface the pipeline needs from the server.
#[async_trait]
pub trait ServerChannel: Send {
    /// Send our public key, receive the text-encoded symmetric-key
    /// ciphertext.
    async fn negotiate_key(&mut self, public_key_pem: &str) -> Result<String, ChannelError>;

    /// Ask how the fractions will be delivered.
    async fn manifest(&mut self) -> Result<Manifest, ChannelError>;

    /// Retrieve the next fraction from the stream endpoint (count mode).
    async fn next_fraction(&mut self) -> Result<Bytes, ChannelError>;

    /// Retrieve the fraction at a specific locator (locator mode).
    async fn fraction_at(&mut self, locator: &str) -> Result<Bytes, ChannelError>;
}

// ── Manifest ──────────────────────────────────────────────────────────────────

/// How the server will hand out fractions. Both deployment modes are live;
/// the manifest response disambiguates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// `n` sequential retrievals from the stream endpoint.
    Count(u32),
    /// One retrieval per locator.
    Locators(Vec<String>),
}

impl Manifest {
    /// Parse a manifest response body: a bare integer is a count, anything
    /// else is a newline-delimited locator list. A body starting with `/` is
    /// always a locator list — a purely numeric path like `/1234` must not
    /// read as a count.
    pub fn parse(body: &str) -> Result<Self, ChannelError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(ChannelError::Protocol("empty manifest response".into()));
        }
        if !trimmed.starts_with('/') {
            if let Ok(count) = trimmed.parse::<u32>() {
                return Ok(Manifest::Count(count));
            }
        }
        let locators = trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Ok(Manifest::Locators(locators))
    }

    /// Number of fractions this manifest promises.
    pub fn fraction_count(&self) -> usize {
        match self {
            Manifest::Count(n) => *n as usize,
            Manifest::Locators(locators) => locators.len(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Protocol(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
