//! Proxy agent CLI.
//!
//! Connects outward to a proxy server so the proxy can forward traffic
//! through this agent, and serves liveness/readiness/metrics locally.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use proxy_agent::agent;
use proxy_agent::options::{AgentOptions, DEFAULT_ADMIN_BIND};

/// Proxy agent - maintains an outbound tunnel connection to a proxy server
#[derive(Parser, Debug)]
#[command(name = "proxy-agent")]
#[command(about = "Connects to the proxy server and allows traffic to be forwarded through it")]
#[command(version)]
struct Args {
    /// Agent identity certificate (PEM); enables mutual auth when paired
    /// with --agent-key
    #[arg(long, env = "PROXY_AGENT_CERT")]
    agent_cert: Option<PathBuf>,

    /// Agent identity private key (PEM); enables mutual auth when paired
    /// with --agent-cert
    #[arg(long, env = "PROXY_AGENT_KEY")]
    agent_key: Option<PathBuf>,

    /// CA certificate (PEM) used to verify the proxy server; system trust
    /// store when unset
    #[arg(long, env = "PROXY_AGENT_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Hostname to use to connect to the proxy server
    #[arg(long, env = "PROXY_AGENT_SERVER_HOST", default_value = "127.0.0.1")]
    proxy_server_host: String,

    /// Port the proxy server is listening on
    #[arg(long, env = "PROXY_AGENT_SERVER_PORT", default_value_t = 8091)]
    proxy_server_port: u16,

    /// Bind address for the admin endpoints (/healthz, /ready, /metrics)
    #[arg(long, env = "PROXY_AGENT_ADMIN_BIND", default_value = DEFAULT_ADMIN_BIND)]
    admin_bind_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for AgentOptions {
    fn from(args: Args) -> Self {
        Self {
            agent_cert: args.agent_cert,
            agent_key: args.agent_key,
            ca_cert: args.ca_cert,
            proxy_server_host: args.proxy_server_host,
            proxy_server_port: args.proxy_server_port,
            admin_bind_addr: args.admin_bind_addr,
        }
    }
}

fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level)?;

    info!("proxy agent starting");

    agent::run(args.into()).await
}
