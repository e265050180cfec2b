//! Observable tunnel connection status.
//!
//! Single-writer/multi-reader cell built on a watch channel: the tunnel
//! client publishes transitions, the admin server reads the current value to
//! answer readiness probes. No locking, no shared mutable state.

use tokio::sync::watch;

/// Connection state of the outbound tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl TunnelStatus {
    /// Numeric encoding used in the metrics exposition (0/1/2).
    pub fn as_gauge(self) -> u8 {
        match self {
            TunnelStatus::Disconnected => 0,
            TunnelStatus::Connecting => 1,
            TunnelStatus::Connected => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TunnelStatus::Disconnected => "disconnected",
            TunnelStatus::Connecting => "connecting",
            TunnelStatus::Connected => "connected",
        }
    }
}

/// Writer half, owned by the tunnel client.
#[derive(Debug, Clone)]
pub struct StatusTx {
    tx: watch::Sender<TunnelStatus>,
}

impl StatusTx {
    pub fn publish(&self, status: TunnelStatus) {
        // Receivers may all be gone (admin server failed to bind); that is
        // not an error for the tunnel side.
        let _ = self.tx.send(status);
    }
}

/// Reader half, held by the admin server and metrics rendering.
#[derive(Debug, Clone)]
pub struct StatusRx {
    rx: watch::Receiver<TunnelStatus>,
}

impl StatusRx {
    pub fn current(&self) -> TunnelStatus {
        *self.rx.borrow()
    }
}

/// Create a status cell starting at `Disconnected`.
pub fn status_channel() -> (StatusTx, StatusRx) {
    let (tx, rx) = watch::channel(TunnelStatus::Disconnected);
    (StatusTx { tx }, StatusRx { rx })
}
