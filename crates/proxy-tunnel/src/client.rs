//! Tunnel client: dials the proxy server and keeps the session alive.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info};

use crate::status::{StatusTx, TunnelStatus};
use crate::tls::ClientTlsConfig;

/// Errors establishing the outbound connection. All of these are fatal to
/// agent startup; there is no retry at this layer.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve proxy server address {address}: {source}")]
    Resolve {
        address: String,
        source: std::io::Error,
    },

    #[error("no addresses found for proxy server {0}")]
    NoAddresses(String),

    #[error("failed to connect to proxy server {address}: {source}")]
    Dial {
        address: String,
        source: std::io::Error,
    },

    #[error("TLS handshake with proxy server {address} failed: {source}")]
    Handshake {
        address: String,
        source: std::io::Error,
    },
}

/// Errors from the running serve loop. Reported to the orchestrator's log
/// boundary only; the connection is not re-established.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("proxy server closed the tunnel connection")]
    ConnectionClosed,

    #[error("tunnel connection failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Transfer counters for the tunnel session, shared with the metrics
/// exposition.
#[derive(Debug, Default)]
pub struct TunnelStats {
    bytes_received: AtomicU64,
    reads: AtomicU64,
}

impl TunnelStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_read(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

/// The live secured connection to the proxy server.
///
/// Owned by the detached serve task once [`TunnelClient::serve`] is spawned;
/// its lifetime is the session lifetime.
#[derive(Debug)]
pub struct TunnelClient {
    stream: TlsStream<TcpStream>,
    peer: SocketAddr,
    status: StatusTx,
    stats: Arc<TunnelStats>,
}

impl TunnelClient {
    /// Connect to the proxy server at `target` (`host:port`).
    ///
    /// Resolution, TCP dial, and the TLS handshake all complete before this
    /// returns. Publishes `Connecting` on entry and `Connected` on success.
    pub async fn connect(
        target: &str,
        tls: &ClientTlsConfig,
        status: StatusTx,
        stats: Arc<TunnelStats>,
    ) -> Result<Self, ConnectError> {
        status.publish(TunnelStatus::Connecting);

        let result = Self::dial(target, tls).await;
        let (stream, peer) = match result {
            Ok(ok) => ok,
            Err(e) => {
                status.publish(TunnelStatus::Disconnected);
                return Err(e);
            }
        };

        info!(peer = %peer, "connected to proxy server");
        status.publish(TunnelStatus::Connected);

        Ok(Self {
            stream,
            peer,
            status,
            stats,
        })
    }

    async fn dial(
        target: &str,
        tls: &ClientTlsConfig,
    ) -> Result<(TlsStream<TcpStream>, SocketAddr), ConnectError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(target)
            .await
            .map_err(|e| ConnectError::Resolve {
                address: target.to_string(),
                source: e,
            })?
            .collect();

        // Prefer IPv4 when the name resolves to both families.
        let addr = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ConnectError::NoAddresses(target.to_string()))?;

        debug!(address = %addr, "dialing proxy server");
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| ConnectError::Dial {
                address: target.to_string(),
                source: e,
            })?;

        let stream = tls
            .connector()
            .connect(tls.server_name(), tcp)
            .await
            .map_err(|e| ConnectError::Handshake {
                address: target.to_string(),
                source: e,
            })?;

        Ok((stream, addr))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Drive the session until the connection ends or shutdown is signalled.
    ///
    /// The forwarding protocol is handled by the proxy side; this loop drains
    /// the channel, keeps the transfer counters current, and reports when the
    /// session is gone. Publishes `Disconnected` on every exit path.
    pub async fn serve(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServeError> {
        let mut buffer = vec![0u8; 16 * 1024];

        let result = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A closed shutdown channel means the orchestrator is
                    // gone; treat it the same as an explicit signal.
                    if changed.is_err() || *shutdown.borrow() {
                        info!(peer = %self.peer, "tunnel serve loop shutting down");
                        break Ok(());
                    }
                }
                read = self.stream.read(&mut buffer) => {
                    match read {
                        Ok(0) => break Err(ServeError::ConnectionClosed),
                        Ok(n) => {
                            self.stats.record_read(n as u64);
                            debug!(peer = %self.peer, bytes = n, "tunnel data received");
                        }
                        Err(e) => break Err(ServeError::Io(e)),
                    }
                }
            }
        };

        self.status.publish(TunnelStatus::Disconnected);
        result
    }
}
