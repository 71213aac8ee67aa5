use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::auth::{AuthContext, CallerIdentity};
use crate::upstream::knowlarity::{CallLogQuery, Click2CallParams};
use crate::upstream::normalize_phone_number;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OutboundRequest {
    pub phone_number: Option<String>,
    pub agent_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn resolve_bridge_agent(
    state: &AppState,
    caller: &CallerIdentity,
    requested: Option<String>,
) -> ApiResult<String> {
    requested
        .or_else(|| state.settings.bolna.default_agent_id.clone())
        .or_else(|| caller.agents.first().map(|a| a.agent_id.clone()))
        .ok_or_else(|| ApiError::bad_request("agent_id is required"))
}

/// Initiate an outbound call: the conversational agent dials the customer
/// through the carrier number.
pub async fn outbound_call(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<OutboundRequest>,
) -> ApiResult<Json<Value>> {
    let caller = auth.require()?;

    let phone_number = body
        .phone_number
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("phone_number is required"))?;

    let agent_id = resolve_bridge_agent(&state, caller, body.agent_id)?;
    if !caller.can_access(&agent_id) {
        return Err(ApiError::forbidden("You do not have access to this agent"));
    }

    let sr_number = state.require_carrier_sr_number()?;

    info!(
        phone_number = %phone_number,
        agent_id = %agent_id,
        initiated_by = %caller.name,
        "initiating outbound call"
    );

    let mut metadata = body.metadata;
    metadata.insert("call_source".into(), json!("knowlarity_outbound"));
    metadata.insert("knowlarity_sr_number".into(), json!(sr_number));
    metadata.insert("initiated_by".into(), json!(caller.name));
    metadata.insert("initiated_at".into(), json!(Utc::now().to_rfc3339()));

    let payload = json!({
        "agent_id": agent_id,
        "recipient_phone_number": phone_number,
        "metadata": metadata,
    });

    let client = state.bolna()?;
    let response = client
        .initiate_call(&payload)
        .await
        .map_err(|e| ApiError::bridge("Failed to initiate call", e))?;

    let execution_id = response
        .get("execution_id")
        .or_else(|| response.get("id"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(Json(json!({
        "success": true,
        "message": "Outbound call initiated successfully",
        "call_details": {
            "phone_number": phone_number,
            "agent_id": agent_id,
            "knowlarity_number": sr_number,
            "bolna_execution_id": execution_id,
            "initiated_by": caller.name,
        },
        "bolna_response": response,
    })))
}

/// Report whether outbound calling is fully configured for this deployment.
pub async fn outbound_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Value>> {
    let caller = auth.require()?;

    let knowlarity_configured = state.settings.knowlarity.api_key.is_some()
        && state.settings.knowlarity.sr_number.is_some();
    let bolna_configured = state.settings.bolna.api_key.is_some();

    Ok(Json(json!({
        "outbound_calls_enabled": knowlarity_configured && bolna_configured,
        "knowlarity_number": state.settings.knowlarity.sr_number,
        "available_agents": caller.agents,
        "user": {
            "name": caller.name,
            "role": caller.role,
        },
    })))
}

/// Carrier webhook for inbound calls: hands the caller over to the
/// conversational agent. Submit-and-acknowledge; the call runs on without us.
pub async fn inbound_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let caller_number = payload
        .get("caller_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing caller_id in webhook payload"))?;

    let call_uuid = payload
        .get("uuid")
        .or_else(|| payload.get("call_id"))
        .cloned()
        .unwrap_or(Value::Null);

    let agent_id = state
        .settings
        .bolna
        .default_agent_id
        .clone()
        .ok_or_else(|| ApiError::config("Server configuration error"))?;

    info!(
        caller = %caller_number,
        agent_id = %agent_id,
        "routing inbound call to agent"
    );

    let bridge_payload = json!({
        "agent_id": agent_id,
        "recipient_phone_number": normalize_phone_number(caller_number),
        "metadata": {
            "knowlarity_uuid": call_uuid,
            "knowlarity_sr_number": payload.get("sr_number").cloned().unwrap_or(Value::Null),
            "call_source": "knowlarity_inbound",
            "call_type": payload.get("call_type").cloned().unwrap_or(Value::Null),
            "start_time": payload.get("start_time").cloned().unwrap_or(Value::Null),
        },
    });

    let client = state.bolna()?;
    let response = client
        .initiate_call(&bridge_payload)
        .await
        .map_err(|e| ApiError::bridge("Failed to route call to agent", e))?;

    let execution_id = response
        .get("execution_id")
        .or_else(|| response.get("id"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(Json(json!({
        "success": true,
        "message": "Call routed to agent",
        "knowlarity_call_id": call_uuid,
        "bolna_execution_id": execution_id,
    })))
}

/// Liveness body for webhook configuration checks from the carrier dashboard.
pub async fn inbound_info() -> Json<Value> {
    Json(json!({
        "message": "Inbound call webhook is active",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct Click2CallRequest {
    pub customer_number: Option<String>,
    pub agent_number: Option<String>,
    pub caller_id: Option<String>,
    #[serde(default)]
    pub is_promotional: bool,
}

/// Bridge a human agent with a customer through the carrier's click-to-call.
pub async fn click_to_call(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Click2CallRequest>,
) -> ApiResult<Json<Value>> {
    auth.require()?;

    let customer_number = body
        .customer_number
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("customer_number is required"))?;

    let client = state.knowlarity()?;
    let response = client
        .click_to_call(&Click2CallParams {
            customer_number: normalize_phone_number(&customer_number),
            agent_number: body.agent_number,
            caller_id: body.caller_id,
            is_promotional: body.is_promotional,
        })
        .await?;

    Ok(Json(json!({"success": true, "carrier_response": response})))
}

#[derive(Debug, Deserialize)]
pub struct CallLogsRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Historical carrier call logs for analytics.
pub async fn call_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<CallLogsRequest>,
) -> ApiResult<Json<Value>> {
    auth.require()?;

    let client = state.knowlarity()?;
    let logs = client
        .call_logs(&CallLogQuery {
            start_date: query.start_date,
            end_date: query.end_date,
            limit: query.limit.unwrap_or(100),
            offset: query.offset.unwrap_or(0),
        })
        .await?;

    Ok(Json(logs))
}
