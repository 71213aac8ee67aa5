use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DynamicStatus;

/// A CSV-driven bulk-calling campaign owned by the upstream provider.
///
/// The `status` string may embed a schedule timestamp as literal text
/// (e.g. "scheduled to run 2024-01-25T14:30:00+00:00"); the core does not
/// interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    #[serde(default)]
    pub status: DynamicStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Batch {
    pub fn sort_key(&self) -> chrono::DateTime<chrono::Utc> {
        super::execution::parse_timestamp(&self.created_at)
    }
}

/// The upstream batch listing returns a bare array today, but has shipped a
/// wrapped object in the past. Accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BatchListing {
    Bare(Vec<Batch>),
    Wrapped { batches: Vec<Batch> },
}

impl BatchListing {
    pub fn into_batches(self) -> Vec<Batch> {
        match self {
            BatchListing::Bare(batches) => batches,
            BatchListing::Wrapped { batches } => batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_bare_array_listing() {
        let listing: BatchListing =
            serde_json::from_value(json!([{"batch_id": "b1", "created_at": "2024-01-02"}]))
                .unwrap();
        assert_eq!(listing.into_batches().len(), 1);
    }

    #[test]
    fn test_accepts_wrapped_listing() {
        let listing: BatchListing =
            serde_json::from_value(json!({"batches": [{"batch_id": "b1"}, {"batch_id": "b2"}]}))
                .unwrap();
        assert_eq!(listing.into_batches().len(), 2);
    }
}
