use axum::extract::{Multipart, Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::aggregator;
use crate::api::error::{ApiError, ApiResult};
use crate::auth::AuthContext;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchListQuery {
    pub agent_id: Option<String>,
}

/// List batches across the caller's agents, merged and sorted most recent
/// first. The upstream listing is unpaginated, so this endpoint is too.
pub async fn list_batches(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<BatchListQuery>,
) -> ApiResult<Json<Value>> {
    let caller = auth.require()?;
    let scope = aggregator::resolve_agent_scope(caller, query.agent_id.as_deref())?;

    if scope.is_empty() {
        return Ok(Json(json!({"batches": [], "total": 0})));
    }

    let client = state.bolna()?;
    let batches = aggregator::fetch_merged_batches(&client, &scope).await;
    info!(count = batches.len(), "merged batch listing");

    Ok(Json(json!({"total": batches.len(), "batches": batches})))
}

/// Upload a contact CSV, creating a new batch campaign for one agent.
pub async fn create_batch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let caller = auth.require()?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut agent_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let field_name = field.name().map(ToString::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field
                    .file_name()
                    .unwrap_or("contacts.csv")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("agent_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read agent_id: {e}")))?;
                if !value.is_empty() {
                    agent_id = Some(value);
                }
            }
            _ => {}
        }
    }

    let (file_name, csv) = file.ok_or_else(|| ApiError::bad_request("CSV file is required"))?;

    let agent_id = agent_id
        .or_else(|| state.settings.bolna.default_agent_id.clone())
        .ok_or_else(|| ApiError::bad_request("Agent ID is required"))?;

    if !caller.can_access(&agent_id) {
        return Err(ApiError::forbidden("You do not have access to this agent"));
    }

    info!(
        agent_id = %agent_id,
        file = %file_name,
        size = csv.len(),
        "uploading batch CSV"
    );

    let client = state.bolna()?;
    let response = client.create_batch(&agent_id, &file_name, csv).await?;
    Ok(Json(response))
}

/// Run a batch "immediately" by scheduling it a few minutes out, which is the
/// upstream's idiom for an unscheduled run.
pub async fn run_batch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require()?;

    let scheduled_at =
        (Utc::now() + Duration::minutes(3)).to_rfc3339_opts(SecondsFormat::Secs, false);

    info!(batch_id = %batch_id, scheduled_at = %scheduled_at, "running batch");

    let client = state.bolna()?;
    let response = client.schedule_batch(&batch_id, &scheduled_at).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Batch scheduled to run",
        "scheduled_at": scheduled_at,
        "upstream": response,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_time: Option<String>,
}

/// Schedule a batch for a caller-chosen instant (ISO 8601 with timezone,
/// must be in the future).
pub async fn schedule_batch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<String>,
    Json(body): Json<ScheduleRequest>,
) -> ApiResult<Json<Value>> {
    auth.require()?;

    let scheduled_time = body.scheduled_time.ok_or_else(|| {
        ApiError::bad_request("scheduled_time is required (ISO 8601 format with timezone)")
    })?;

    let parsed = DateTime::parse_from_rfc3339(&scheduled_time).map_err(|_| {
        ApiError::bad_request(
            "Invalid scheduled_time format. Use ISO 8601 format (e.g., 2024-01-25T14:30:00+05:30)",
        )
    })?;

    if parsed < Utc::now() {
        return Err(ApiError::bad_request("scheduled_time must be in the future"));
    }

    info!(batch_id = %batch_id, scheduled_at = %scheduled_time, "scheduling batch");

    let client = state.bolna()?;
    let response = client.schedule_batch(&batch_id, &scheduled_time).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Batch scheduled",
        "scheduled_at": scheduled_time,
        "upstream": response,
    })))
}

pub async fn stop_batch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require()?;
    info!(batch_id = %batch_id, "stopping batch");
    let client = state.bolna()?;
    let response = client.stop_batch(&batch_id).await?;
    Ok(Json(response))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require()?;
    info!(batch_id = %batch_id, "deleting batch");
    let client = state.bolna()?;
    let response = client.delete_batch(&batch_id).await?;
    Ok(Json(response))
}

/// Per-contact execution results of a batch, for the results view.
pub async fn batch_executions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require()?;
    let client = state.bolna()?;
    let response = client.batch_executions(&batch_id).await?;
    Ok(Json(response))
}
