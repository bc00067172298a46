//! The relay engine: one dispatch per inbound datagram.
//!
//! A single UDP socket carries both directions. Datagrams from the
//! configured upstream address are replies and are routed back to the
//! waiting client by transaction ID; everything else is a client query that
//! is either answered locally (blacklisted) or forwarded verbatim.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::{ConfigHandle, ResponseType};
use crate::dns;
use crate::stats::Stats;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// A query forwarded upstream, waiting for its reply.
struct PendingQuery {
    client: SocketAddr,
    domain: String,
    received: Instant,
}

/// What to do with one inbound datagram.
pub enum Verdict {
    /// Send this synthesized response back to the sender.
    Respond(Vec<u8>),
    /// Send the datagram unchanged to the upstream resolver.
    Forward(SocketAddr),
    /// Send the datagram unchanged to the recorded client.
    Deliver(SocketAddr),
    /// Malformed, unsolicited, or otherwise unwanted. No reply.
    Discard,
}

/// Stateless-per-datagram dispatcher over shared tracking state.
pub struct Relay {
    config: ConfigHandle,
    stats: Arc<Stats>,
    /// In-flight queries keyed by transaction ID alone. A colliding query
    /// overwrites the previous entry, so the upstream's single reply goes
    /// to the most recent client; the earlier one times out and retries.
    pending: Mutex<FxHashMap<u16, PendingQuery>>,
}

impl Relay {
    pub fn new(config: ConfigHandle, stats: Arc<Stats>) -> Self {
        Self {
            config,
            stats,
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    /// Decide what to do with a datagram received from `src`.
    ///
    /// Pure decision logic: the caller performs whatever send the verdict
    /// asks for. Malformed datagrams never produce a verdict with output.
    pub fn dispatch(&self, data: &[u8], src: SocketAddr) -> Verdict {
        let snapshot = self.config.current();

        let Ok(id) = dns::transaction_id(data) else {
            self.stats.record_dropped();
            return Verdict::Discard;
        };

        if src == snapshot.upstream {
            return self.dispatch_reply(id);
        }

        let Ok(domain) = dns::question_name(data) else {
            self.stats.record_dropped();
            return Verdict::Discard;
        };

        if snapshot.blacklist.is_blacklisted(&domain) {
            let response = match snapshot.response_type {
                ResponseType::Redirect => dns::redirect_response(data, snapshot.redirect_ip),
                denial => dns::denial_response(data, denial.rcode()),
            };
            return match response {
                Ok(payload) => {
                    self.stats.record_blocked();
                    info!(%domain, "blocked");
                    Verdict::Respond(payload)
                }
                Err(_) => {
                    self.stats.record_dropped();
                    Verdict::Discard
                }
            };
        }

        self.stats.record_forwarded();
        debug!(%domain, id, "forwarding to upstream");

        let Ok(mut pending) = self.pending.lock() else {
            return Verdict::Discard;
        };
        pending.insert(
            id,
            PendingQuery {
                client: src,
                domain,
                received: Instant::now(),
            },
        );
        Verdict::Forward(snapshot.upstream)
    }

    /// A datagram from the upstream address: relay it to whoever asked.
    fn dispatch_reply(&self, id: u16) -> Verdict {
        let entry = {
            let Ok(mut pending) = self.pending.lock() else {
                return Verdict::Discard;
            };
            pending.remove(&id)
        };

        match entry {
            Some(query) => {
                let elapsed_ms = query.received.elapsed().as_secs_f64() * 1000.0;
                self.stats.record_relayed(elapsed_ms);
                debug!(domain = %query.domain, elapsed_ms, "relayed upstream reply");
                Verdict::Deliver(query.client)
            }
            None => {
                self.stats.record_dropped();
                debug!(id, "unsolicited upstream reply");
                Verdict::Discard
            }
        }
    }

    /// Receive loop over the shared socket.
    ///
    /// Send failures are logged and the datagram dropped; nothing here
    /// terminates the loop.
    pub async fn run(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

        loop {
            let (len, src) = match socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("UDP recv error: {e}");
                    continue;
                }
            };
            let data = &buf[..len];

            match self.dispatch(data, src) {
                Verdict::Respond(response) => {
                    if let Err(e) = socket.send_to(&response, src).await {
                        warn!("UDP send error to {src}: {e}");
                    }
                }
                Verdict::Forward(upstream) => {
                    if let Err(e) = socket.send_to(data, upstream).await {
                        warn!("UDP forward error to {upstream}: {e}");
                    }
                }
                Verdict::Deliver(client) => {
                    if let Err(e) = socket.send_to(data, client).await {
                        warn!("UDP send error to {client}: {e}");
                    }
                }
                Verdict::Discard => {}
            }
        }
    }
}
