use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DynamicStatus;

/// One upstream call attempt and its recorded outcome, as returned by the
/// provider's per-agent execution listing. Aggregation input only; fields the
/// aggregator does not recognize are preserved opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub status: DynamicStatus,
    /// Hundredths of the display unit.
    #[serde(default)]
    pub total_cost: f64,
    /// Seconds.
    #[serde(default)]
    pub conversation_duration: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionRecord {
    /// Sort key for merged result sets: descending by creation time.
    pub fn sort_key(&self) -> DateTime<Utc> {
        parse_timestamp(&self.created_at)
    }
}

/// One page of executions as the upstream returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPage {
    #[serde(default)]
    pub data: Vec<ExecutionRecord>,
    #[serde(default)]
    pub total: u64,
}

/// Parse an upstream timestamp leniently.
///
/// The provider emits RFC 3339 in some paths and naive datetimes (no offset)
/// in others; batch records occasionally carry bare dates. Anything
/// unparseable sorts to the epoch instead of failing the merge.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return naive.and_utc();
        }
    }
    DateTime::<Utc>::UNIX_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_rfc3339() {
        let parsed = parse_timestamp("2024-01-25T14:30:00+00:00");
        assert_eq!(parsed.to_rfc3339(), "2024-01-25T14:30:00+00:00");
    }

    #[test]
    fn test_parses_naive_datetime() {
        let parsed = parse_timestamp("2024-01-25T14:30:00.123");
        assert_eq!(parsed.timestamp(), 1706193000);
    }

    #[test]
    fn test_parses_bare_date() {
        let parsed = parse_timestamp("2024-01-02");
        assert_eq!(parsed.to_rfc3339(), "2024-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_unparseable_sorts_to_epoch() {
        assert_eq!(parse_timestamp("not a date"), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(parse_timestamp(""), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = serde_json::json!({
            "id": "exec-1",
            "created_at": "2024-01-02",
            "status": "completed",
            "total_cost": 250.0,
            "conversation_duration": 10.0,
            "telephony_data": {"to_number": "+911234567890"},
        });
        let record: ExecutionRecord = serde_json::from_value(raw.clone()).unwrap();
        assert!(record.extra.contains_key("telephony_data"));
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }
}
