//! Fraction wire format — one encrypted segment of the payload.
//!
//! Every fraction travels as a 52-byte header followed by its ciphertext.
//! The header carries an explicit sequence index: position in the payload is
//! always taken from the wire, never inferred from download order, so the
//! server is free to deliver fractions in any order over either transport
//! mode. Integer fields are big-endian.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Marks the start of every fraction. Inherited from protocol version 1;
/// anything else is rejected before the body is even looked at.
pub const FRACTION_MAGIC: u32 = 0xDEAD_BEEF;

/// AES-256-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length — the ciphertext can never be
/// shorter than this.
const TAG_LEN: usize = 16;

// ── Wire header ───────────────────────────────────────────────────────────────

/// On-wire fraction header. Wire size: 52 bytes.
///
/// Changing any field is a protocol break for every deployed server.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FractionHeader {
    /// Must equal `FRACTION_MAGIC`.
    pub magic: U32<BigEndian>,

    /// Sequence index: this fraction's position in the original payload.
    /// Indices of a complete set form exactly `0..N-1`.
    pub index: U32<BigEndian>,

    /// Per-fraction AES-256-GCM nonce, chosen by the server.
    pub nonce: [u8; NONCE_LEN],

    /// BLAKE3 digest of the ciphertext. Verified before decryption under the
    /// explicit integrity policy; ignored under the implicit policy.
    pub digest: [u8; 32],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FractionHeader, [u8; 52]);

/// Header length in bytes.
pub const HEADER_LEN: usize = std::mem::size_of::<FractionHeader>();

// ── Fraction ──────────────────────────────────────────────────────────────────

/// One parsed fraction. Immutable after creation; consumed exactly once by
/// the assembler.
#[derive(Debug, Clone)]
pub struct Fraction {
    index: u32,
    nonce: [u8; NONCE_LEN],
    digest: [u8; 32],
    ciphertext: Bytes,
}

impl Fraction {
    /// Build a fraction from its parts. Exists for the encoding side
    /// (servers, test harnesses); the client itself only ever parses.
    pub fn new(index: u32, nonce: [u8; NONCE_LEN], digest: [u8; 32], ciphertext: Bytes) -> Self {
        Self {
            index,
            nonce,
            digest,
            ciphertext,
        }
    }

    /// Parse one transmitted fraction body.
    pub fn parse(raw: &[u8]) -> Result<Self, FractionError> {
        let header = FractionHeader::read_from_prefix(raw)
            .ok_or(FractionError::TooShort { got: raw.len() })?;

        let magic = header.magic.get();
        if magic != FRACTION_MAGIC {
            return Err(FractionError::BadMagic(magic));
        }

        let ciphertext = &raw[HEADER_LEN..];
        if ciphertext.len() < TAG_LEN {
            return Err(FractionError::TruncatedCiphertext(ciphertext.len()));
        }

        Ok(Self {
            index: header.index.get(),
            nonce: header.nonce,
            digest: header.digest,
            ciphertext: Bytes::copy_from_slice(ciphertext),
        })
    }

    /// Encode to the wire layout (header followed by ciphertext).
    pub fn encode(&self) -> Vec<u8> {
        let header = FractionHeader {
            magic: U32::new(FRACTION_MAGIC),
            index: U32::new(self.index),
            nonce: self.nonce,
            digest: self.digest,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FractionError {
    #[error("fraction body too short for header: {got} bytes, need {HEADER_LEN}")]
    TooShort { got: usize },

    #[error("bad fraction magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("fraction ciphertext truncated: {0} bytes is below the AEAD tag size")]
    TruncatedCiphertext(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
