use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::models::ConversationRecord;
use crate::store::ConversationStore;
use crate::AppState;

/// Liveness interval for the event stream.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Frame pushed over the event stream, one JSON object per `data:` line.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    Connected { message: String },
    Conversation { data: ConversationRecord },
    Heartbeat { timestamp: i64 },
}

/// Receive a call-result payload from the provider webhook.
///
/// `id` and `transcript` are required; the rest of the payload is stored as
/// delivered. Storing replaces the previous conversation and notifies every
/// live stream client.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let has_id = payload
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    let has_transcript = payload
        .get("transcript")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());

    if !has_id || !has_transcript {
        return Err(ApiError::bad_request(
            "Missing required fields: id and transcript",
        ));
    }

    let record: ConversationRecord = serde_json::from_value(payload)
        .map_err(|e| ApiError::bad_request(format!("Invalid conversation payload: {e}")))?;

    info!(
        conversation_id = %record.id,
        transcript_len = record.transcript.len(),
        status = %record.status,
        "received conversation webhook"
    );

    let conversation_id = record.id.clone();
    state
        .store
        .set(record)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store conversation: {e}")))?;

    Ok(Json(json!({
        "success": true,
        "message": "Webhook received successfully",
        "conversationId": conversation_id,
    })))
}

/// Static instructions body, so the endpoint can be probed from a browser.
pub async fn webhook_info() -> Json<Value> {
    Json(json!({
        "message": "Webhook endpoint is active",
        "endpoint": "/api/webhook",
        "method": "POST",
        "instructions": "Send POST requests with conversation data to this endpoint",
    }))
}

/// Current conversation, or JSON `null` if none has been received.
pub async fn latest(State(state): State<AppState>) -> ApiResult<Json<Option<ConversationRecord>>> {
    let conversation = state
        .store
        .get()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch conversation: {e}")))?;
    Ok(Json(conversation))
}

/// Server-sent event stream of conversation updates.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = spawn_live_stream(state.store.clone(), HEARTBEAT_INTERVAL).await;
    Sse::new(UnboundedReceiverStream::new(frames).map(|frame| Ok(Event::default().data(frame))))
}

/// Start one per-client relay between the event bus and an outbound frame
/// channel.
///
/// The relay emits a connection acknowledgement, then forwards every bus
/// publish as a conversation frame and ticks a heartbeat on `heartbeat`.
/// A client disconnect closes the frame channel and stops the relay right
/// away; a failed emit is the fallback. Either way the loop exits and the
/// bus subscription is released, so a disconnect leaks neither a timer nor a
/// subscription.
pub async fn spawn_live_stream(
    store: Arc<ConversationStore>,
    heartbeat: Duration,
) -> mpsc::UnboundedReceiver<String> {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let bus = store.bus().clone();

    tokio::spawn(async move {
        let connected = StreamFrame::Connected {
            message: "Connected to live updates".to_string(),
        };
        if send_frame(&frame_tx, &connected).is_err() {
            return;
        }

        let (subscription, mut updates) = bus.subscribe().await;
        let mut ticker = tokio::time::interval(heartbeat);
        // The first tick fires immediately; consume it so heartbeats start
        // one interval after connect.
        ticker.tick().await;

        loop {
            let frame = tokio::select! {
                update = updates.recv() => match update {
                    Some(record) => StreamFrame::Conversation { data: record },
                    None => break,
                },
                _ = ticker.tick() => StreamFrame::Heartbeat {
                    timestamp: Utc::now().timestamp_millis(),
                },
                // Dropping the stream closes the channel; stop immediately
                // instead of waiting for the next emit to fail.
                _ = frame_tx.closed() => break,
            };
            if send_frame(&frame_tx, &frame).is_err() {
                // Client gone; treat the failed emit as a disconnect.
                break;
            }
        }

        bus.unsubscribe(subscription).await;
        debug!("live stream client disconnected");
    });

    frame_rx
}

fn send_frame(tx: &mpsc::UnboundedSender<String>, frame: &StreamFrame) -> Result<(), ()> {
    let payload = serde_json::to_string(frame).map_err(|_| ())?;
    tx.send(payload).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventBus;

    fn record(id: &str) -> ConversationRecord {
        serde_json::from_value(json!({
            "id": id,
            "transcript": "assistant: hello",
        }))
        .unwrap()
    }

    fn store() -> Arc<ConversationStore> {
        Arc::new(ConversationStore::in_memory(Arc::new(EventBus::new())))
    }

    async fn next_json(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame within timeout")
            .expect("stream still open");
        serde_json::from_str(&frame).unwrap()
    }

    /// The relay registers with the bus just after the connected frame, so
    /// tests publish only once the subscription is visible.
    async fn wait_for_subscribers(bus: &crate::store::EventBus, expected: usize) {
        for _ in 0..100 {
            if bus.subscriber_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(bus.subscriber_count().await, expected);
    }

    #[tokio::test]
    async fn test_stream_opens_with_connected_frame() {
        let mut rx = spawn_live_stream(store(), Duration::from_secs(60)).await;
        let frame = next_json(&mut rx).await;
        assert_eq!(frame["type"], "connected");
    }

    #[tokio::test]
    async fn test_stream_forwards_published_conversations() {
        let store = store();
        let mut rx = spawn_live_stream(store.clone(), Duration::from_secs(60)).await;
        let _connected = next_json(&mut rx).await;
        wait_for_subscribers(store.bus(), 1).await;

        store.set(record("c-1")).await.unwrap();

        let frame = next_json(&mut rx).await;
        assert_eq!(frame["type"], "conversation");
        assert_eq!(frame["data"]["id"], "c-1");
    }

    #[tokio::test]
    async fn test_stream_emits_heartbeats() {
        let mut rx = spawn_live_stream(store(), Duration::from_millis(10)).await;
        let _connected = next_json(&mut rx).await;

        let frame = next_json(&mut rx).await;
        assert_eq!(frame["type"], "heartbeat");
        assert!(frame["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_disconnect_releases_the_subscription_promptly() {
        let store = store();
        let bus = store.bus().clone();

        // Production heartbeat interval: release must not wait for a tick.
        let mut rx = spawn_live_stream(store.clone(), HEARTBEAT_INTERVAL).await;
        let _connected = next_json(&mut rx).await;
        wait_for_subscribers(&bus, 1).await;

        drop(rx);

        // The relay sees the closed channel well before any heartbeat fires.
        for _ in 0..100 {
            if bus.subscriber_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_webhook_rejects_missing_transcript() {
        let state = AppState::for_tests();
        let result = receive_webhook(
            State(state),
            Json(json!({"id": "c-1"})),
        )
        .await;

        let err = result.err().expect("missing transcript must be rejected");
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_stores_and_echoes_conversation_id() {
        let state = AppState::for_tests();

        let response = receive_webhook(
            State(state.clone()),
            Json(json!({"id": "c-9", "transcript": "user: hi", "status": "completed"})),
        )
        .await
        .unwrap();
        assert_eq!(response.0["conversationId"], "c-9");

        let current = latest(State(state)).await.unwrap();
        assert_eq!(current.0.unwrap().id, "c-9");
    }
}
