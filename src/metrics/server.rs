//! HTTP exposition endpoint for the counter registry

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::registry::MetricsRegistry;
use crate::{IndexerError, Result};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], registry.render())
}

/// Running `/metrics` endpoint
pub struct MetricsServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MetricsServer {
    /// Bind `addr` and serve `GET /metrics` in the background
    pub async fn start(addr: SocketAddr, registry: Arc<MetricsRegistry>) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| IndexerError::MetricsServer { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| IndexerError::MetricsServer { addr, source })?;

        let app = Router::new().route("/metrics", get(metrics_handler)).with_state(registry);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!("Metrics server stopped: {}", e);
            }
        });

        info!("Metrics server listening on http://{}/metrics", local_addr);
        Ok(Self { local_addr, cancel, task })
    }

    /// Address actually bound, useful when started on port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting scrapes and wait for in-flight requests
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Metrics server task failed: {}", e);
        }
    }
}
