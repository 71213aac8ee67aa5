use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status-like field from an upstream payload.
///
/// Upstream providers are loose about these fields: the same key may arrive as
/// a plain string, a structured object, or null depending on the call path.
/// The ambiguity is absorbed here at the boundary and normalized to a single
/// display string before anything else looks at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynamicStatus {
    Text(String),
    Structured(Map<String, Value>),
    Unknown(Value),
}

impl DynamicStatus {
    /// Normalized display representation.
    ///
    /// Structured payloads are probed for the conventional keys; anything
    /// unrecognized collapses to "unknown".
    pub fn normalized(&self) -> &str {
        match self {
            DynamicStatus::Text(s) if !s.is_empty() => s,
            DynamicStatus::Structured(map) => map
                .get("status")
                .or_else(|| map.get("state"))
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
            _ => "unknown",
        }
    }

    pub fn is(&self, status: &str) -> bool {
        self.normalized() == status
    }
}

impl Default for DynamicStatus {
    fn default() -> Self {
        DynamicStatus::Unknown(Value::Null)
    }
}

impl fmt::Display for DynamicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_plain_string() {
        let status: DynamicStatus = serde_json::from_value(json!("completed")).unwrap();
        assert_eq!(status.normalized(), "completed");
        assert!(status.is("completed"));
    }

    #[test]
    fn test_parses_structured_object() {
        let status: DynamicStatus =
            serde_json::from_value(json!({"status": "busy", "code": 486})).unwrap();
        assert_eq!(status.normalized(), "busy");
    }

    #[test]
    fn test_null_and_unexpected_shapes_normalize_to_unknown() {
        let null: DynamicStatus = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(null.normalized(), "unknown");

        let number: DynamicStatus = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(number.normalized(), "unknown");
    }

    #[test]
    fn test_round_trips_original_shape() {
        let original = json!({"state": "in-progress"});
        let status: DynamicStatus = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&status).unwrap(), original);
    }
}
