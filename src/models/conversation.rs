use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DynamicStatus;

/// One call's full result payload, delivered by the provider webhook.
///
/// Only the fields the dashboard interprets are typed; everything else
/// (usage/cost/latency breakdowns, telephony metadata, extraction output) is
/// carried opaquely and round-tripped without loss. `total_cost` is
/// denominated in hundredths of the display unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    /// Newline-delimited "speaker: message" lines.
    pub transcript: String,
    #[serde(default)]
    pub status: DynamicStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub initiated_at: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub rescheduled_at: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub conversation_duration: f64,
    /// Hundredths of the display unit.
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub telephony_data: Option<Value>,
    #[serde(default)]
    pub usage_breakdown: Option<Value>,
    #[serde(default)]
    pub cost_breakdown: Option<Value>,
    #[serde(default)]
    pub latency_data: Option<Value>,
    /// Pass-through for fields the core does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
