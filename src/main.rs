mod aggregator;
mod api;
mod auth;
mod config;
mod models;
mod store;
mod upstream;

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::{batches, calls, conversations, executions};
use crate::auth::auth_middleware;
use crate::config::{Settings, StorageKind};
use crate::store::{ConversationStore, EventBus};
use crate::upstream::{BolnaClient, KnowlarityClient};

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    /// Single process-wide conversation slot plus its event bus.
    pub store: Arc<ConversationStore>,
    /// Shared connection pool for all upstream calls.
    pub http: reqwest::Client,
}

impl AppState {
    /// Provider client for this request. Credentials are validated here, per
    /// request, so a missing key fails one call instead of the process.
    pub fn bolna(&self) -> Result<BolnaClient, ApiError> {
        let api_key = self
            .settings
            .bolna
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::config("Missing Bolna API key in configuration"))?;
        Ok(BolnaClient::new(
            self.http.clone(),
            self.settings.bolna.api_url.clone(),
            api_key,
        ))
    }

    /// Carrier client for this request.
    pub fn knowlarity(&self) -> Result<KnowlarityClient, ApiError> {
        let api_key = self
            .settings
            .knowlarity
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::config("Missing Knowlarity API key in configuration"))?;
        let sr_number = self.require_carrier_sr_number()?;
        Ok(KnowlarityClient::new(self.http.clone(), api_key, sr_number))
    }

    pub fn require_carrier_sr_number(&self) -> Result<String, ApiError> {
        self.settings
            .knowlarity
            .sr_number
            .clone()
            .ok_or_else(|| ApiError::config("Missing Knowlarity SR number in configuration"))
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            settings: Settings::default(),
            store: Arc::new(ConversationStore::in_memory(bus)),
            http: reqwest::Client::new(),
        }
    }
}

// ============================================================================
// Health check handler
// ============================================================================

async fn health_check() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

// ============================================================================
// Router
// ============================================================================

fn build_router(state: AppState) -> Router {
    let settings = state.settings.clone();

    // Provider/carrier webhooks and the live view cannot carry a bearer
    // token, so they sit outside the auth middleware.
    let open = Router::new()
        .route("/api", get(health_check))
        .route(
            "/api/webhook",
            post(conversations::receive_webhook).get(conversations::webhook_info),
        )
        .route("/api/latest", get(conversations::latest))
        .route("/api/events", get(conversations::events))
        .route(
            "/api/calls/inbound",
            post(calls::inbound_webhook).get(calls::inbound_info),
        );

    let protected = Router::new()
        // Execution routes
        .route("/api/executions", get(executions::list_executions))
        .route("/api/executions/metrics", get(executions::execution_metrics))
        .route("/api/executions/:execution_id", get(executions::get_execution))
        .route(
            "/api/executions/:execution_id/log",
            get(executions::get_execution_log),
        )
        .route("/api/recording", get(executions::proxy_recording))
        // Batch routes
        .route(
            "/api/batches",
            get(batches::list_batches).post(batches::create_batch),
        )
        .route("/api/batches/:batch_id", delete(batches::delete_batch))
        .route("/api/batches/:batch_id/run", post(batches::run_batch))
        .route("/api/batches/:batch_id/schedule", post(batches::schedule_batch))
        .route("/api/batches/:batch_id/stop", post(batches::stop_batch))
        .route(
            "/api/batches/:batch_id/executions",
            get(batches::batch_executions),
        )
        // Call bridge routes
        .route(
            "/api/calls/outbound",
            post(calls::outbound_call).get(calls::outbound_status),
        )
        .route("/api/calls/click-to-call", post(calls::click_to_call))
        .route("/api/calls/logs", get(calls::call_logs))
        .layer(axum::middleware::from_fn_with_state(
            settings,
            auth_middleware,
        ));

    open.merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Calldeck API Server");

    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let bus = Arc::new(EventBus::new());
    let store = match settings.storage.backend {
        StorageKind::Memory => Arc::new(ConversationStore::in_memory(bus)),
        StorageKind::File => {
            let path = settings.storage.resolved_path();
            info!(path = %path.display(), "using file-backed conversation store");
            Arc::new(ConversationStore::file_backed(path, bus))
        }
    };

    let state = AppState {
        settings: settings.clone(),
        store,
        http: reqwest::Client::new(),
    };

    let addr = format!("{}:{}", &settings.basic.host, &settings.basic.port);
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
