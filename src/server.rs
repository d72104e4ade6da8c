//! Axum HTTP endpoint for the matter store.
//!
//! Exposes the response envelope the way a remote object-query API would:
//! `GET /query?q=<select>` answers with the envelope, `POST /reload`
//! re-reads the configured source. Queries share a read guard on the store;
//! reload takes the write guard, so a reload never overlaps a query.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, oneshot};
use tower_http::trace::TraceLayer;

use crate::config::StoreConfig;
use crate::envelope::ResponseEnvelope;
use crate::error::StoreError;
use crate::store::{LoadSummary, MatterStore};

pub struct ServerState {
    pub store: RwLock<MatterStore>,
    pub config: StoreConfig,
}

impl ServerState {
    pub fn new(store: MatterStore, config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            store: RwLock::new(store),
            config,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: StoreError) -> ApiError {
    let status = match &err {
        StoreError::Query { .. } => StatusCode::BAD_REQUEST,
        StoreError::MalformedRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::StoreClosed => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Io { .. } | StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let detail = std::error::Error::source(&err).map(|source| source.to_string());
    if status.is_server_error() {
        tracing::error!(error = %err, "Matter request failed");
    } else {
        tracing::debug!(error = %err, "Matter request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            detail,
        }),
    )
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/query", get(query_handler))
        .route("/reload", post(reload_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle to a running server task.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!("Matter server task ended abnormally: {}", e);
        }
    }
}

pub async fn start_server(
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;
    let app = router(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Matter server shutting down");
            })
            .await
        {
            tracing::error!("Matter server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Matter server listening");
    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx,
        task,
    })
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn query_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let store = state.store.read().await;
    store.execute(&params.q).await.map(Json).map_err(api_error)
}

async fn reload_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<LoadSummary>, ApiError> {
    let mut store = state.store.write().await;
    store
        .load_configured(&state.config)
        .await
        .map(Json)
        .map_err(api_error)
}
