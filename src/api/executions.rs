use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::aggregator::{self, metrics, Page, PageRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::auth::AuthContext;
use crate::models::ExecutionRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecutionListQuery {
    /// Narrow the scope to one agent (ownership-checked).
    pub agent_id: Option<String>,
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
    pub call_type: Option<String>,
}

impl ExecutionListQuery {
    fn page(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest {
            page_number: self.page_number.unwrap_or(defaults.page_number),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
    }
}

/// List executions across every agent in the caller's scope, merged, sorted
/// most recent first, and re-paginated over the merged set.
pub async fn list_executions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ExecutionListQuery>,
) -> ApiResult<Json<Page<ExecutionRecord>>> {
    let caller = auth.require()?;
    let scope = aggregator::resolve_agent_scope(caller, query.agent_id.as_deref())?;
    let page = query.page();

    if scope.is_empty() {
        return Ok(Json(Page::empty(&page)));
    }

    let client = state.bolna()?;
    debug!(agents = scope.len(), "fetching executions across agent scope");
    let merged =
        aggregator::fetch_merged_executions(&client, &scope, query.status, query.call_type).await;

    Ok(Json(aggregator::paginate(merged, &page)))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub agent_id: Option<String>,
}

/// Summary statistics over the caller's merged execution set.
pub async fn execution_metrics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<metrics::Metrics>> {
    let caller = auth.require()?;
    let scope = aggregator::resolve_agent_scope(caller, query.agent_id.as_deref())?;

    if scope.is_empty() {
        return Ok(Json(metrics::compute(&[])));
    }

    let client = state.bolna()?;
    let merged = aggregator::fetch_merged_executions(&client, &scope, None, None).await;

    Ok(Json(metrics::compute(&merged)))
}

#[derive(Debug, Deserialize)]
pub struct ExecutionDetailQuery {
    pub agent_id: Option<String>,
}

/// Fetch one execution in full from the agent that owns it.
pub async fn get_execution(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(execution_id): Path<String>,
    Query(query): Query<ExecutionDetailQuery>,
) -> ApiResult<Json<Value>> {
    let caller = auth.require()?;

    let agent_id = match query.agent_id {
        Some(requested) => {
            if !caller.can_access(&requested) {
                return Err(ApiError::forbidden("You do not have access to this agent"));
            }
            requested
        }
        None => caller
            .agents
            .first()
            .map(|a| a.agent_id.clone())
            .ok_or_else(|| ApiError::bad_request("agent_id is required"))?,
    };

    let client = state.bolna()?;
    let execution = client.get_execution(&agent_id, &execution_id).await?;
    Ok(Json(execution))
}

/// Fetch the raw component log for one execution.
pub async fn get_execution_log(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(execution_id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require()?;
    let client = state.bolna()?;
    let log = client.get_execution_log(&execution_id).await?;
    Ok(Json(log))
}

#[derive(Debug, Deserialize)]
pub struct RecordingQuery {
    pub url: String,
}

/// Streaming passthrough for call recordings, so the browser can play them
/// without hitting the provider's CORS policy.
pub async fn proxy_recording(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<RecordingQuery>,
) -> ApiResult<Response> {
    auth.require()?;

    let upstream = state
        .http
        .get(&query.url)
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch recording: {e}")))?;

    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/mpeg")
        .to_string();

    Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::internal(format!("Failed to build recording response: {e}")))
}
