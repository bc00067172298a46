//! Configuration document, immutable snapshot and periodic reload.
//!
//! The on-disk document is TOML:
//!
//! ```toml
//! [upstream]
//! host = "8.8.8.8"
//! port = 53
//!
//! blacklist = ["example.com", "*.badwebsite.org"]
//! blacklist_response_type = "REFUSED"
//! redirect_ip = "127.0.0.1"
//! reload_interval = 60
//! ```
//!
//! Each successful load produces a complete [`Snapshot`] that is published
//! atomically through [`ConfigHandle`]; a dispatch in flight either sees the
//! old snapshot or the new one, never a mix. A failed reload leaves the
//! previous snapshot authoritative.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::filter::Blacklist;

/// Delay before retrying after a failed reload.
const RELOAD_RETRY_DELAY: Duration = Duration::from_secs(10);

const DEFAULT_RELOAD_INTERVAL: u64 = 60;

/// Errors while loading the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("upstream {host}:{port} does not resolve to an IPv4 address")]
    Upstream { host: String, port: u16 },
}

/// The raw configuration document as written on disk.
#[derive(Debug, Deserialize)]
pub struct Document {
    pub upstream: UpstreamAddr,
    #[serde(default)]
    pub blacklist: Vec<String>,
    pub blacklist_response_type: ResponseType,
    pub redirect_ip: Ipv4Addr,
    #[serde(default = "default_reload_interval")]
    pub reload_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamAddr {
    pub host: String,
    pub port: u16,
}

fn default_reload_interval() -> u64 {
    DEFAULT_RELOAD_INTERVAL
}

/// What to answer for a blacklisted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseType {
    Nxdomain,
    Refused,
    Redirect,
}

impl ResponseType {
    /// The RCODE carried by the synthesized response. Redirect answers with
    /// RCODE 0 and an A record instead of an error code.
    pub fn rcode(self) -> u16 {
        match self {
            ResponseType::Nxdomain => 3,
            ResponseType::Refused => 5,
            ResponseType::Redirect => 0,
        }
    }
}

/// Immutable view of one successfully loaded configuration.
///
/// The blacklist matcher is always derived from the same document as the
/// other fields; the snapshot is replaced wholesale or not at all.
#[derive(Debug)]
pub struct Snapshot {
    pub upstream: SocketAddr,
    pub blacklist: Blacklist,
    pub response_type: ResponseType,
    pub redirect_ip: Ipv4Addr,
    pub reload_interval: Duration,
}

impl Snapshot {
    pub fn from_document(doc: Document) -> Result<Self, ConfigError> {
        let upstream = resolve_upstream(&doc.upstream.host, doc.upstream.port)?;

        Ok(Self {
            upstream,
            blacklist: Blacklist::compile(doc.blacklist),
            response_type: doc.blacklist_response_type,
            redirect_ip: doc.redirect_ip,
            reload_interval: Duration::from_secs(doc.reload_interval),
        })
    }
}

/// Read, parse and compile the configuration document at `path`.
pub fn load(path: &Path) -> Result<Snapshot, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Document = toml::from_str(&text)?;
    Snapshot::from_document(doc)
}

fn resolve_upstream(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let not_ipv4 = || ConfigError::Upstream {
        host: host.to_string(),
        port,
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|_| not_ipv4())?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(not_ipv4)
}

/// Cloneable handle to the currently published snapshot.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<Snapshot>>,
}

impl ConfigHandle {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// The snapshot published at this instant. Callers hold the returned
    /// `Arc` for the duration of one dispatch so a concurrent reload cannot
    /// change the configuration out from under them.
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    pub fn replace(&self, snapshot: Snapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

/// Periodically reload the document and publish new snapshots.
///
/// Sleeps the current snapshot's `reload_interval` between reloads. A
/// failed load keeps the previous snapshot and retries after a short fixed
/// delay until a load succeeds, then the normal cadence resumes.
pub async fn reload_loop(handle: ConfigHandle, path: PathBuf) {
    loop {
        tokio::time::sleep(handle.current().reload_interval).await;

        loop {
            match load(&path) {
                Ok(snapshot) => {
                    info!(
                        rules = snapshot.blacklist.len(),
                        upstream = %snapshot.upstream,
                        "configuration reloaded"
                    );
                    handle.replace(snapshot);
                    break;
                }
                Err(e) => {
                    warn!("configuration reload failed: {e}; keeping previous settings");
                    tokio::time::sleep(RELOAD_RETRY_DELAY).await;
                }
            }
        }
    }
}
