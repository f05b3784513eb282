//! ember — fetches an encrypted kernel module over the network, reassembles
//! it, and installs it into the running kernel.

mod loader;
mod pipeline;

use std::time::Duration;

use anyhow::Context;
use ember_client::HttpChannel;
use ember_core::config::EmberConfig;

use crate::loader::KernelLoader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // init_module needs CAP_SYS_MODULE; fail before any network traffic.
    if unsafe { libc::geteuid() } != 0 {
        anyhow::bail!("must run as root to load kernel modules");
    }

    match EmberConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "could not write default config"),
    }
    let config = EmberConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config load failed, using defaults");
        EmberConfig::default()
    });

    let timeout = Duration::from_secs(config.transfer.request_timeout_secs);
    let mut channel = HttpChannel::connect(&config.server.host, config.server.port, timeout)
        .await
        .with_context(|| {
            format!(
                "connecting to {}:{}",
                config.server.host, config.server.port
            )
        })?;

    if let Err(e) = pipeline::run(&mut channel, &KernelLoader, &config).await {
        tracing::error!(error = %e, "run failed");
        std::process::exit(1);
    }

    tracing::info!("module installed");
    Ok(())
}
