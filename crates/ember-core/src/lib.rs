//! ember-core — key exchange, fraction model, and payload assembly.
//! The client and test crates depend on this one; it performs no I/O.

pub mod assemble;
pub mod config;
pub mod crypto;
pub mod fraction;

pub use assemble::{assemble, AssembleError, AssembledPayload, IntegrityError, IntegrityPolicy};
pub use crypto::{KeyExchangeError, KeyPair, SymmetricKey};
pub use fraction::{Fraction, FractionError};
