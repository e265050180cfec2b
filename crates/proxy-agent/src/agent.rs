//! Agent orchestration: validate, connect the tunnel, start the admin
//! server, wait for termination.
//!
//! Leaf components return typed errors; severity classification and
//! escalation happen here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::admin::AdminServer;
use crate::metrics::AgentMetrics;
use crate::options::AgentOptions;
use proxy_tunnel::{status_channel, ClientTlsConfig, TunnelClient, TunnelStats};

/// How severe a failure is for the process as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The process cannot do its job; exit non-zero.
    Fatal,
    /// A capability is lost but the tunnel (or the process) keeps going.
    Degraded,
    /// Expected noise; log at low level and move on.
    Ignorable,
}

/// Where an error was produced. Severity is a function of origin alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    Validation,
    ChannelBuild,
    TunnelConnect,
    AdminBind,
    TunnelServe,
    AdminServe,
}

impl ErrorOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorOrigin::Validation => "validation",
            ErrorOrigin::ChannelBuild => "channel-build",
            ErrorOrigin::TunnelConnect => "tunnel-connect",
            ErrorOrigin::AdminBind => "admin-bind",
            ErrorOrigin::TunnelServe => "tunnel-serve",
            ErrorOrigin::AdminServe => "admin-serve",
        }
    }
}

/// The escalation policy. Pre-connection errors are fatal; the admin surface
/// is best-effort; post-startup serve failures stay at the log boundary.
pub fn severity(origin: ErrorOrigin) -> Severity {
    match origin {
        ErrorOrigin::Validation | ErrorOrigin::ChannelBuild | ErrorOrigin::TunnelConnect => {
            Severity::Fatal
        }
        ErrorOrigin::AdminBind | ErrorOrigin::TunnelServe => Severity::Degraded,
        ErrorOrigin::AdminServe => Severity::Ignorable,
    }
}

/// Log a non-fatal error according to the severity policy.
fn log_runtime_error(origin: ErrorOrigin, err: &dyn std::fmt::Display) {
    match severity(origin) {
        // Fatal errors are escalated by `run`, never routed here.
        Severity::Fatal => {
            error!(origin = origin.as_str(), error = %err, "fatal error");
        }
        Severity::Degraded => {
            warn!(origin = origin.as_str(), error = %err, "continuing in degraded state");
        }
        Severity::Ignorable => {
            debug!(origin = origin.as_str(), error = %err, "ignoring error");
        }
    }
}

/// Run the agent until a termination signal arrives.
///
/// Sequence: log effective configuration, validate, build the secured
/// channel and connect the tunnel (fatal on failure, before the admin server
/// exists), spawn the detached serve and admin tasks, then block on signals.
pub async fn run(options: AgentOptions) -> Result<()> {
    options.log_effective();

    // Validation strictly precedes any network activity (Fatal per policy).
    options
        .validate()
        .context("failed to validate agent options")?;

    let metrics = Arc::new(AgentMetrics::new());
    let stats = Arc::new(TunnelStats::new());
    let (status_tx, status_rx) = status_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tls = ClientTlsConfig::build(
        options.ca_cert(),
        options.agent_cert(),
        options.agent_key(),
        &options.proxy_server_host,
    )
    .context("failed to build secured channel configuration")?;

    let target = options.proxy_server_addr();
    let client = TunnelClient::connect(&target, &tls, status_tx, stats.clone())
        .await
        .with_context(|| format!("failed to connect to proxy server at {}", target))?;
    metrics.tunnel_connected();

    // Detached serve task. A lost tunnel flips readiness and is logged; no
    // reconnect at this layer.
    let tunnel_shutdown = shutdown_rx.clone();
    let tunnel_task = tokio::spawn(async move {
        if let Err(e) = client.serve(tunnel_shutdown).await {
            log_runtime_error(ErrorOrigin::TunnelServe, &e);
        }
    });

    // The admin surface is best-effort: a failed bind degrades the agent but
    // does not stop the tunnel.
    let admin = AdminServer::new(status_rx, metrics, stats);
    match TcpListener::bind(options.admin_bind_addr).await {
        Ok(listener) => {
            info!(addr = %options.admin_bind_addr, "admin server listening");
            let admin_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = admin.run(listener, admin_shutdown).await {
                    log_runtime_error(ErrorOrigin::AdminServe, &e);
                }
            });
        }
        Err(e) => log_runtime_error(ErrorOrigin::AdminBind, &e),
    }

    shutdown_signal().await;
    info!("termination signal received, shutting down");

    // Flip the shutdown channel and give the serve loop a moment to drain.
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), tunnel_task)
        .await
        .is_err()
    {
        warn!("tunnel serve task did not stop in time");
    }

    Ok(())
}

/// Wait for Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("failed to listen for ctrl-c: {}", e);
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("failed to listen for ctrl-c: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn startup_errors_are_fatal() {
        assert_eq!(severity(ErrorOrigin::Validation), Severity::Fatal);
        assert_eq!(severity(ErrorOrigin::ChannelBuild), Severity::Fatal);
        assert_eq!(severity(ErrorOrigin::TunnelConnect), Severity::Fatal);
    }

    #[test]
    fn admin_and_serve_failures_do_not_kill_the_process() {
        assert_eq!(severity(ErrorOrigin::AdminBind), Severity::Degraded);
        assert_eq!(severity(ErrorOrigin::TunnelServe), Severity::Degraded);
        assert_eq!(severity(ErrorOrigin::AdminServe), Severity::Ignorable);
    }

    #[tokio::test]
    async fn run_fails_fast_on_invalid_options() {
        let options = AgentOptions {
            agent_key: Some(PathBuf::from("/tmp/definitely-missing.key")),
            ..Default::default()
        };
        let err = run(options).await.unwrap_err();
        assert!(err.to_string().contains("validate"));
    }

    #[tokio::test]
    async fn run_fails_fast_on_unreachable_proxy() {
        // Reserve a port with nothing listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let options = AgentOptions {
            proxy_server_port: port,
            ..Default::default()
        };
        let err = run(options).await.unwrap_err();
        assert!(err.to_string().contains("failed to connect to proxy server"));
    }
}
