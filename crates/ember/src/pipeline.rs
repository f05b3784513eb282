//! The delivery pipeline — one run, five stages, strictly in order.
//!
//! generate keypair → negotiate symmetric key → fetch fractions →
//! assemble payload → deliver to the loader.
//!
//! Every stage failure aborts the whole run; there is no partial-success
//! mode and no automatic retry. Resources acquired by earlier stages (the
//! keypair, the fraction set, intermediate buffers) are scoped to this
//! function and released on every exit path.

use ember_client::{fetch_all, ChannelError, FetchError, ServerChannel};
use ember_core::config::EmberConfig;
use ember_core::{assemble, AssembleError, KeyExchangeError, KeyPair};
use thiserror::Error;

use crate::loader::{LoadError, ModuleLoader};

/// Run the full pipeline over an established channel.
pub async fn run<C, L>(
    channel: &mut C,
    loader: &L,
    config: &EmberConfig,
) -> Result<(), RunError>
where
    C: ServerChannel + ?Sized,
    L: ModuleLoader + ?Sized,
{
    // Key exchange. The keypair lives exactly as long as this block: it is
    // consumed by the recovery call, so the private half cannot leak into
    // later stages.
    let keypair = KeyPair::generate()?;
    let pem = keypair.public_key_pem()?;
    tracing::info!("ephemeral keypair generated, negotiating symmetric key");
    let encoded = channel.negotiate_key(&pem).await?;
    let key = keypair.recover_symmetric_key(&encoded)?;
    tracing::info!(key_len = key.len(), "symmetric key recovered");

    // Fetch — all fractions or nothing.
    let fractions = fetch_all(channel).await?;
    tracing::info!(count = fractions.len(), "fractions downloaded");

    // Assemble — order, verify, decrypt, concatenate.
    let payload = assemble(fractions, &key, config.transfer.integrity)?;
    tracing::info!(bytes = payload.len(), "payload assembled");

    // Deployment policy: replace an already-loaded module before delivering.
    let module = &config.module;
    if module.replace_existing && !module.name.is_empty() && loader.is_loaded(&module.name)? {
        tracing::info!(module = %module.name, "unloading already-loaded module");
        loader.unload(&module.name)?;
    }

    loader.deliver(payload.as_bytes())?;
    tracing::info!(bytes = payload.len(), "payload delivered to loader");
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A run failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("key exchange failed: {0}")]
    KeyExchange(#[from] KeyExchangeError),

    #[error("key negotiation transport failed: {0}")]
    Negotiate(#[from] ChannelError),

    #[error("fraction fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("payload assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    #[error("module load failed: {0}")]
    Load(#[from] LoadError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
