//! Outbound tunnel client for the proxy agent.
//!
//! This crate owns the secured channel to the proxy server: building the
//! client-side TLS configuration from operator-supplied credential paths,
//! dialing the proxy endpoint, and keeping the resulting session drained
//! until the connection ends or shutdown is requested. The forwarding
//! protocol carried over the channel lives on the proxy side and is not
//! interpreted here.

pub mod client;
pub mod status;
pub mod tls;

pub use client::{ConnectError, ServeError, TunnelClient, TunnelStats};
pub use status::{status_channel, StatusRx, StatusTx, TunnelStatus};
pub use tls::{ClientTlsConfig, TlsError};
