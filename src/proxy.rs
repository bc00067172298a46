//! Relay orchestration.
//!
//! Loads the initial configuration, binds the shared socket and runs the
//! relay alongside the reload and stats tasks.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::info;

use crate::config::{self, ConfigError, ConfigHandle};
use crate::relay::Relay;
use crate::stats::Stats;

/// Startup options for the relay.
pub struct ProxyConfig {
    /// Local address to bind (e.g., 0.0.0.0:5353)
    pub bind_addr: SocketAddr,
    /// Path to the configuration document, re-read on the reload schedule.
    pub config_path: PathBuf,
}

/// The only fatal errors: a bad initial document or an unbindable socket.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Run the relay with the given options. Runs indefinitely.
pub async fn run(proxy: ProxyConfig) -> Result<(), StartError> {
    let snapshot = config::load(&proxy.config_path)?;
    info!(
        rules = snapshot.blacklist.len(),
        upstream = %snapshot.upstream,
        "configuration loaded"
    );

    let socket = Arc::new(
        UdpSocket::bind(proxy.bind_addr)
            .await
            .map_err(|source| StartError::Bind {
                addr: proxy.bind_addr,
                source,
            })?,
    );
    info!("DNS relay listening on {}", proxy.bind_addr);

    let handle = ConfigHandle::new(snapshot);
    let stats = Arc::new(Stats::new());
    let relay = Arc::new(Relay::new(handle.clone(), stats.clone()));

    tokio::spawn(config::reload_loop(handle, proxy.config_path));

    // Report stats every minute
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = stats.snapshot_and_reset();
            info!(
                "[stats] uptime={}s requests={} forwarded={} relayed={} blocked={} dropped={} avg_response={:.2}ms",
                stats.uptime_secs,
                stats.requests,
                stats.forwarded,
                stats.relayed,
                stats.blocked,
                stats.dropped,
                stats.avg_response_ms
            );
        }
    });

    relay.run(socket).await;

    Ok(())
}
