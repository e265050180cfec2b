//! Admin HTTP surface: liveness, readiness, metrics.
//!
//! The listener is bound by the orchestrator, which classifies bind
//! failures; serve-loop errors never escalate beyond the log boundary.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::AgentMetrics;
use proxy_tunnel::{StatusRx, TunnelStats, TunnelStatus};

#[derive(Clone)]
struct AdminState {
    status: StatusRx,
    metrics: Arc<AgentMetrics>,
    stats: Arc<TunnelStats>,
}

/// The agent's operational HTTP endpoint set.
pub struct AdminServer {
    state: AdminState,
}

impl AdminServer {
    pub fn new(status: StatusRx, metrics: Arc<AgentMetrics>, stats: Arc<TunnelStats>) -> Self {
        Self {
            state: AdminState {
                status,
                metrics,
                stats,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(handle_healthz))
            .route("/ready", get(handle_ready))
            .route("/metrics", get(handle_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on the pre-bound listener until the shutdown channel flips.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let router = self.router();

        let wait_for_shutdown = async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("admin server shutting down");
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(wait_for_shutdown)
            .await
    }
}

/// Process liveness. Always `200 ok` once the server is bound; does not
/// read tunnel state.
async fn handle_healthz(State(state): State<AdminState>) -> impl IntoResponse {
    state.metrics.admin_request();
    (StatusCode::OK, "ok")
}

/// Readiness reflects whether the agent can serve its purpose: the tunnel
/// must be connected.
async fn handle_ready(State(state): State<AdminState>) -> impl IntoResponse {
    state.metrics.admin_request();
    match state.status.current() {
        TunnelStatus::Connected => (StatusCode::OK, "ok"),
        status => (StatusCode::SERVICE_UNAVAILABLE, status.as_str()),
    }
}

async fn handle_metrics(State(state): State<AdminState>) -> impl IntoResponse {
    state.metrics.admin_request();
    let body = state
        .metrics
        .prometheus_export(state.status.current(), &state.stats);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
