use serde::Serialize;

use crate::models::ExecutionRecord;

/// Summary statistics over a merged execution set. Costs are converted from
/// upstream hundredths to the display unit here.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_executions: usize,
    pub total_cost: f64,
    pub total_duration: f64,
    pub avg_cost: f64,
    pub avg_duration: f64,
    pub status_counts: StatusCounts,
}

/// The two tracked status buckets. Other statuses still count toward totals
/// but get no bucket of their own.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCounts {
    pub busy: usize,
    pub completed: usize,
}

/// Pure reduction; no upstream calls.
pub fn compute(executions: &[ExecutionRecord]) -> Metrics {
    let total_cost: f64 = executions.iter().map(|e| e.total_cost / 100.0).sum();
    let total_duration: f64 = executions.iter().map(|e| e.conversation_duration).sum();

    let busy = executions.iter().filter(|e| e.status.is("busy")).count();
    let completed = executions
        .iter()
        .filter(|e| e.status.is("completed"))
        .count();

    let count = executions.len();
    let (avg_cost, avg_duration) = if count > 0 {
        (total_cost / count as f64, total_duration / count as f64)
    } else {
        (0.0, 0.0)
    };

    Metrics {
        total_executions: count,
        total_cost,
        total_duration,
        avg_cost,
        avg_duration,
        status_counts: StatusCounts { busy, completed },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn execution(cost: f64, status: &str, duration: f64) -> ExecutionRecord {
        serde_json::from_value(json!({
            "id": "exec",
            "total_cost": cost,
            "status": status,
            "conversation_duration": duration,
        }))
        .unwrap()
    }

    #[test]
    fn test_empty_set_yields_zeroed_metrics() {
        let metrics = compute(&[]);
        assert_eq!(metrics.total_executions, 0);
        assert_eq!(metrics.avg_cost, 0.0);
        assert_eq!(metrics.avg_duration, 0.0);
    }

    #[test]
    fn test_reduces_costs_durations_and_status_buckets() {
        let executions = vec![
            execution(250.0, "completed", 10.0),
            execution(150.0, "busy", 5.0),
        ];
        let metrics = compute(&executions);

        assert_eq!(metrics.total_executions, 2);
        assert_eq!(metrics.total_cost, 4.0);
        assert_eq!(metrics.total_duration, 15.0);
        assert_eq!(metrics.avg_cost, 2.0);
        assert_eq!(metrics.avg_duration, 7.5);
        assert_eq!(metrics.status_counts, StatusCounts { busy: 1, completed: 1 });
    }

    #[test]
    fn test_untracked_statuses_count_toward_totals_only() {
        let executions = vec![
            execution(100.0, "in-progress", 3.0),
            execution(100.0, "completed", 7.0),
        ];
        let metrics = compute(&executions);

        assert_eq!(metrics.total_executions, 2);
        assert_eq!(metrics.total_cost, 2.0);
        assert_eq!(metrics.status_counts, StatusCounts { busy: 0, completed: 1 });
    }

    #[test]
    fn test_serializes_with_dashboard_field_names() {
        let value = serde_json::to_value(compute(&[])).unwrap();
        assert!(value.get("totalExecutions").is_some());
        assert!(value.get("avgDuration").is_some());
        assert!(value["statusCounts"].get("busy").is_some());
    }
}
