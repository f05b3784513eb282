//! Key exchange primitives for Ember.
//!
//! One run uses exactly one ephemeral RSA-2048 keypair. The public half is
//! exported as SPKI PEM and sent to the server; the server answers with the
//! symmetric key encrypted under it (OAEP-SHA256, then base64). Recovering
//! the symmetric key consumes the keypair — the private half cannot outlive
//! the exchange.
//!
//! All decryption failures collapse into one opaque error variant. A caller
//! (or an attacker watching the caller) cannot distinguish a padding failure
//! from a wrong-length ciphertext or a wrong key.

use base64::{prelude::BASE64_STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// RSA modulus size. One keypair per run, so generation cost is paid once.
const KEY_BITS: usize = 2048;

// ── Symmetric key ─────────────────────────────────────────────────────────────

/// The server-chosen symmetric key, exactly as OAEP decryption produced it.
///
/// Length is whatever the server sent — no padding, no truncation. The bytes
/// are zeroized on drop and never appear in Debug output or logs.
pub struct SymmetricKey(Zeroizing<Vec<u8>>);

impl SymmetricKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        write!(f, "SymmetricKey({} bytes)", self.0.len())
    }
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// An ephemeral RSA keypair, alive for at most one key exchange.
///
/// The private key never leaves this struct and is never serialized;
/// `recover_symmetric_key` takes `self` by value so the keypair is destroyed
/// the moment the symmetric key exists.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS entropy source.
    pub fn generate() -> Result<Self, KeyExchangeError> {
        let private =
            RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(KeyExchangeError::Generation)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Serialize the public half as SPKI PEM for transmission to the server.
    pub fn public_key_pem(&self) -> Result<String, KeyExchangeError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(KeyExchangeError::Serialization)
    }

    /// Decode and decrypt the server's key response.
    ///
    /// `encoded` is the base64 blob the server returned: the symmetric key
    /// encrypted under our public half with OAEP-SHA256. Consumes the keypair.
    pub fn recover_symmetric_key(self, encoded: &str) -> Result<SymmetricKey, KeyExchangeError> {
        let ciphertext = BASE64_STANDARD.decode(encoded.trim())?;
        let key = self
            .private
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|_| KeyExchangeError::Decryption)?;
        Ok(SymmetricKey::new(key))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum KeyExchangeError {
    #[error("keypair generation failed: {0}")]
    Generation(#[source] rsa::Error),

    #[error("public key serialization failed: {0}")]
    Serialization(#[source] rsa::pkcs8::spki::Error),

    #[error("key response is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Opaque by design. Carrying the underlying cause here would hand a
    /// padding oracle to whoever controls the ciphertext.
    #[error("key decryption failed")]
    Decryption,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
