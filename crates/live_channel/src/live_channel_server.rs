use crate::{ClientRegistry, ClientSession};
use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use common::domain::{BrokerConnectionState, ReadingRepository};
use envira_runner::AppProcess;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DATABASE_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveChannelConfig {
    pub host: String,
    pub port: u16,
    /// Upgrade requests beyond this many connected clients get 503
    pub max_clients: usize,
}

impl Default for LiveChannelConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_clients: 100,
        }
    }
}

impl LiveChannelConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct AppState {
    registry: Arc<ClientRegistry>,
    broker_state: watch::Receiver<BrokerConnectionState>,
    repository: Arc<dyn ReadingRepository>,
    max_clients: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub mqtt_broker: String,
    /// "connected" when the reading store answers a ping
    pub database: String,
    pub active_websockets: usize,
}

/// HTTP server exposing `/ws` for live readings and `/health`
pub struct LiveChannelServer {
    config: LiveChannelConfig,
    state: Arc<AppState>,
}

impl LiveChannelServer {
    pub fn new(
        config: LiveChannelConfig,
        registry: Arc<ClientRegistry>,
        broker_state: watch::Receiver<BrokerConnectionState>,
        repository: Arc<dyn ReadingRepository>,
    ) -> Self {
        let state = Arc::new(AppState {
            registry,
            broker_state,
            repository,
            max_clients: config.max_clients,
        });
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener until `ctx` is cancelled
    pub async fn serve(self, listener: TcpListener, ctx: CancellationToken) -> anyhow::Result<()> {
        let app = self.router();
        let registry = self.state.registry.clone();

        info!(address = ?listener.local_addr().ok(), "live channel listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                ctx.cancelled().await;
                // Sessions only finish once their queues are gone
                registry.close_all().await;
            })
            .await?;

        info!("live channel stopped");
        Ok(())
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new(move |ctx| {
            Box::pin(async move {
                let address = self.config.bind_address();
                let listener = TcpListener::bind(&address).await.map_err(|e| {
                    anyhow::anyhow!("failed to bind live channel on {}: {}", address, e)
                })?;
                self.serve(listener, ctx).await
            })
        })
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(handle) = state.registry.try_connect(state.max_clients).await else {
        warn!(max_clients = state.max_clients, "connection rejected: live channel full or closing");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let client_id = handle.id;
    let on_failure = state.registry.clone();
    let registry = state.registry.clone();

    ws.on_failed_upgrade(move |e| {
        warn!(client_id = %client_id, error = %e, "WebSocket upgrade failed");
        tokio::spawn(async move {
            on_failure.unregister(client_id).await;
        });
    })
    .on_upgrade(move |socket| ClientSession::new(registry, handle).run(socket))
    .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let broker_state = *state.broker_state.borrow();
    let database = match tokio::time::timeout(DATABASE_PING_TIMEOUT, state.repository.ping()).await
    {
        Ok(Ok(())) => "connected",
        Ok(Err(e)) => {
            warn!(error = %e, "reading store ping failed");
            "disconnected"
        }
        Err(_) => {
            warn!("reading store ping timed out");
            "disconnected"
        }
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        mqtt_broker: broker_state.to_string(),
        database: database.to_string(),
        active_websockets: state.registry.client_count().await,
    })
}
