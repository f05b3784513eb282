//! Fraction fetcher — retrieves the complete fraction set, or nothing.
//!
//! The manifest decides the transport mode: a count means N sequential
//! retrievals from the stream endpoint, a locator list means one retrieval
//! per locator. Either way every fraction arrives with its sequence index in
//! its own header, so the order of retrieval carries no meaning.
//!
//! Fetching is all-or-nothing: the first failed retrieval or malformed body
//! aborts, and the fractions gathered so far go out of scope with the error.
//! No partial set is ever returned.

use ember_core::fraction::{Fraction, FractionError};
use thiserror::Error;

use crate::channel::{ChannelError, Manifest, ServerChannel};

/// Hard ceiling on the fraction count a manifest may claim. Keeps a
/// misbehaving server from driving a huge allocation before the first
/// retrieval.
pub const MAX_FRACTIONS: u32 = 1 << 16;

/// Retrieve and parse every fraction the manifest promises.
pub async fn fetch_all<C>(channel: &mut C) -> Result<Vec<Fraction>, FetchError>
where
    C: ServerChannel + ?Sized,
{
    let manifest = channel.manifest().await?;
    let count = manifest.fraction_count();
    if count > MAX_FRACTIONS as usize {
        return Err(FetchError::CountOutOfRange(count));
    }

    let mut fractions = Vec::with_capacity(count);
    match manifest {
        Manifest::Count(n) => {
            tracing::debug!(count = n, "fetching fractions from stream endpoint");
            for i in 0..n {
                let raw = channel.next_fraction().await?;
                let fraction = Fraction::parse(&raw)?;
                tracing::debug!(
                    retrieval = i,
                    index = fraction.index(),
                    bytes = raw.len(),
                    "fraction downloaded"
                );
                fractions.push(fraction);
            }
        }
        Manifest::Locators(locators) => {
            tracing::debug!(count = locators.len(), "fetching fractions by locator");
            for locator in &locators {
                let raw = channel.fraction_at(locator).await?;
                let fraction = Fraction::parse(&raw)?;
                tracing::debug!(
                    locator = locator.as_str(),
                    index = fraction.index(),
                    bytes = raw.len(),
                    "fraction downloaded"
                );
                fractions.push(fraction);
            }
        }
    }

    Ok(fractions)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Channel(#[from] ChannelError),

    #[error("malformed fraction: {0}")]
    Malformed(#[from] FractionError),

    #[error("manifest claims {0} fractions, limit is {MAX_FRACTIONS}")]
    CountOutOfRange(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
