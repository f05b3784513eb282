//! Payload assembly — ordering, integrity verification, decryption,
//! and byte-exact concatenation of fractions.
//!
//! The assembler is all-or-nothing. It consumes the fetched fraction set,
//! proves the sequence indices form an unbroken run `0..N-1`, verifies
//! integrity according to the configured policy, decrypts every fraction
//! with the single negotiated key, and only then releases a payload. Any
//! failure aborts with nothing partial observable by the caller.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::SymmetricKey;
use crate::fraction::Fraction;

// ── Integrity policy ──────────────────────────────────────────────────────────

/// How fraction integrity is established. Configured per deployment, never
/// auto-detected — the server and client must agree out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Verify the BLAKE3 digest each fraction carries over its ciphertext
    /// before any decryption is attempted. Tampering is reported as an
    /// integrity violation, not a decryption failure.
    Explicit,

    /// Rely on the AEAD authentication tag alone. The header digest is
    /// ignored; tampering surfaces as a decryption failure.
    Implicit,
}

impl std::str::FromStr for IntegrityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explicit" => Ok(Self::Explicit),
            "implicit" => Ok(Self::Implicit),
            other => Err(format!("unknown integrity policy: {other:?}")),
        }
    }
}

// ── Assembled payload ─────────────────────────────────────────────────────────

/// The fully decrypted, ordered, contiguous payload. Only ever constructed
/// after every fraction has been verified and decrypted.
#[derive(Debug)]
pub struct AssembledPayload(Vec<u8>);

impl AssembledPayload {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

// ── Payload buffer ────────────────────────────────────────────────────────────

/// Growable plaintext accumulator with a single ownership point.
///
/// The final payload length is not known until the last fraction decrypts, so
/// the buffer grows as chunks append. Growth goes through `try_reserve`:
/// allocation failure is reported as an error instead of aborting the
/// process, and the partially filled buffer is dropped with the error —
/// never handed onward.
pub struct PayloadBuffer {
    buf: Vec<u8>,
}

impl PayloadBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one plaintext chunk, growing the buffer if needed. Bytes
    /// already written are never invalidated by growth.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), AssembleError> {
        self.buf
            .try_reserve(chunk.len())
            .map_err(|_| AssembleError::OutOfMemory(chunk.len()))?;
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn into_payload(self) -> AssembledPayload {
        AssembledPayload(self.buf)
    }
}

impl Default for PayloadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// Order, verify, decrypt, and concatenate a fetched fraction set.
///
/// Arrival order is irrelevant: fractions are sorted by their wire-carried
/// sequence index, which must form exactly `0..N-1`. Under the explicit
/// policy every digest is checked before the first decryption. Decryption is
/// AES-256-GCM with the fraction's nonce and its big-endian index as
/// associated data, binding each ciphertext to its position.
pub fn assemble(
    mut fractions: Vec<Fraction>,
    key: &SymmetricKey,
    policy: IntegrityPolicy,
) -> Result<AssembledPayload, AssembleError> {
    fractions.sort_unstable_by_key(Fraction::index);

    for (expected, fraction) in fractions.iter().enumerate() {
        let index = fraction.index();
        if index == expected as u32 {
            continue;
        }
        if expected > 0 && index == fractions[expected - 1].index() {
            return Err(IntegrityError::DuplicateIndex(index).into());
        }
        return Err(IntegrityError::MissingIndex(expected as u32).into());
    }

    if policy == IntegrityPolicy::Explicit {
        for fraction in &fractions {
            let computed = blake3::hash(fraction.ciphertext());
            if computed.as_bytes() != fraction.digest() {
                return Err(IntegrityError::ChecksumMismatch(fraction.index()).into());
            }
        }
    }

    // A wrong-length key fails the same way a wrong key does.
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| AssembleError::Decryption(0))?;

    let mut buffer = PayloadBuffer::new();
    for fraction in &fractions {
        let aad = fraction.index().to_be_bytes();
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(fraction.nonce()),
                Payload {
                    msg: fraction.ciphertext(),
                    aad: &aad,
                },
            )
            .map_err(|_| AssembleError::Decryption(fraction.index()))?;
        buffer.append(&plaintext)?;
    }

    tracing::debug!(
        fractions = fractions.len(),
        bytes = buffer.len(),
        "payload assembled"
    );
    Ok(buffer.into_payload())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A protocol violation in the fraction set itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("duplicate fraction index {0}")]
    DuplicateIndex(u32),

    #[error("missing fraction index {0}")]
    MissingIndex(u32),

    #[error("fraction {0} checksum mismatch")]
    ChecksumMismatch(u32),
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("missing, duplicate, or tampered fraction: {0}")]
    Integrity(#[from] IntegrityError),

    /// Opaque: wrong key, corrupted ciphertext, and tag mismatch all land
    /// here with no distinguishing detail.
    #[error("fraction {0} failed to decrypt")]
    Decryption(u32),

    #[error("payload buffer could not grow by {0} bytes")]
    OutOfMemory(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
