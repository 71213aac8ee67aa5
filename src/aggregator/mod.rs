// Multi-agent aggregation.
//
// Execution and batch records live only upstream, one listing per agent. A
// caller may own several agents, so the listing endpoints fan out one request
// per authorized agent, merge the results, sort by creation time and
// re-paginate over the merged sequence.

pub mod metrics;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::auth::CallerIdentity;
use crate::models::{Batch, ExecutionRecord};
use crate::upstream::{ExecutionQuery, ExecutionSource};

/// Per-agent fetch size for "all records" fan-outs. Agents with more
/// executions than this are silently truncated; see DESIGN.md.
pub const FETCH_ALL_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("You do not have access to this agent")]
    NotOwned(String),
}

/// Pagination request over the merged sequence. Page numbers start at 1.
#[derive(Debug, Clone, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_number() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_number: default_page_number(),
            page_size: default_page_size(),
        }
    }
}

/// One page of a merged result set. `total_count` and `total_pages` describe
/// the merged sequence, not any individual upstream response.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total_count: u64,
    pub total_pages: u64,
    pub page_number: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn empty(request: &PageRequest) -> Self {
        Self {
            data: Vec::new(),
            total_count: 0,
            total_pages: 0,
            page_number: request.page_number.max(1),
            page_size: request.page_size.max(1),
        }
    }
}

/// Resolve which upstream agent ids a request may fan out over.
///
/// An explicit `agent_id` narrows the scope to exactly that agent after an
/// ownership check (admins bypass it); otherwise the scope is everything the
/// caller owns. An empty result means "answer empty without touching
/// upstream".
pub fn resolve_agent_scope(
    caller: &CallerIdentity,
    requested: Option<&str>,
) -> Result<Vec<String>, ScopeError> {
    match requested {
        Some(agent_id) => {
            if caller.can_access(agent_id) {
                Ok(vec![agent_id.to_string()])
            } else {
                Err(ScopeError::NotOwned(agent_id.to_string()))
            }
        }
        None => Ok(caller.agent_ids()),
    }
}

/// Fan out one execution listing per agent, concurrently, and merge.
///
/// A failed per-agent fetch contributes zero records instead of failing the
/// request; the merge is best-effort. The merged sequence is sorted descending
/// by creation time (stable, so ties keep fetch order).
pub async fn fetch_merged_executions(
    source: &dyn ExecutionSource,
    agent_ids: &[String],
    status: Option<String>,
    call_type: Option<String>,
) -> Vec<ExecutionRecord> {
    let query = ExecutionQuery {
        page_number: 1,
        page_size: FETCH_ALL_PAGE_SIZE,
        status,
        call_type,
    };

    // Each block captures the shared query and its agent id by reference.
    let query = &query;
    let fetches = agent_ids
        .iter()
        .map(|agent_id| async move {
            match source.list_executions(agent_id, query).await {
                Ok(page) => page.data,
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "execution fetch failed, contributing zero records");
                    Vec::new()
                }
            }
        })
        .collect::<Vec<_>>();

    let mut merged: Vec<ExecutionRecord> = join_all(fetches).await.into_iter().flatten().collect();
    merged.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    merged
}

/// Fan out one batch listing per agent and merge, most recent first.
pub async fn fetch_merged_batches(source: &dyn ExecutionSource, agent_ids: &[String]) -> Vec<Batch> {
    let fetches = agent_ids
        .iter()
        .map(|agent_id| async move {
            match source.list_batches(agent_id).await {
                Ok(batches) => batches,
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "batch fetch failed, contributing zero records");
                    Vec::new()
                }
            }
        })
        .collect::<Vec<_>>();

    let mut merged: Vec<Batch> = join_all(fetches).await.into_iter().flatten().collect();
    merged.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    merged
}

/// Paginate an already-merged sequence.
pub fn paginate<T>(items: Vec<T>, request: &PageRequest) -> Page<T> {
    let page_number = request.page_number.max(1);
    let page_size = request.page_size.max(1);

    let total_count = items.len() as u64;
    let total_pages = total_count.div_ceil(page_size as u64);

    let start = (page_number as usize - 1).saturating_mul(page_size as usize);
    let data = if start >= items.len() {
        Vec::new()
    } else {
        items
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect()
    };

    Page {
        data,
        total_count,
        total_pages,
        page_number,
        page_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::config::{AgentConfig, Role};
    use crate::models::ExecutionPage;
    use crate::upstream::UpstreamError;

    /// Simulated upstream: canned per-agent responses plus a call counter.
    struct FakeSource {
        executions: HashMap<String, Vec<ExecutionRecord>>,
        batches: HashMap<String, Vec<Batch>>,
        failing: Vec<String>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                executions: HashMap::new(),
                batches: HashMap::new(),
                failing: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_agent(mut self, agent_id: &str, records: Vec<ExecutionRecord>) -> Self {
            self.executions.insert(agent_id.to_string(), records);
            self
        }

        fn with_batches(mut self, agent_id: &str, batches: Vec<Batch>) -> Self {
            self.batches.insert(agent_id.to_string(), batches);
            self
        }

        fn with_failing_agent(mut self, agent_id: &str) -> Self {
            self.failing.push(agent_id.to_string());
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExecutionSource for FakeSource {
        async fn list_executions(
            &self,
            agent_id: &str,
            _query: &ExecutionQuery,
        ) -> Result<ExecutionPage, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&agent_id.to_string()) {
                return Err(UpstreamError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let data = self.executions.get(agent_id).cloned().unwrap_or_default();
            let total = data.len() as u64;
            Ok(ExecutionPage { data, total })
        }

        async fn list_batches(&self, agent_id: &str) -> Result<Vec<Batch>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&agent_id.to_string()) {
                return Err(UpstreamError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.batches.get(agent_id).cloned().unwrap_or_default())
        }
    }

    fn execution(id: &str, created_at: &str) -> ExecutionRecord {
        serde_json::from_value(json!({"id": id, "created_at": created_at})).unwrap()
    }

    fn batch(id: &str, created_at: &str) -> Batch {
        serde_json::from_value(json!({"batch_id": id, "created_at": created_at})).unwrap()
    }

    fn caller(role: Role, agent_ids: &[&str]) -> CallerIdentity {
        CallerIdentity {
            name: "tester".to_string(),
            role,
            agents: agent_ids
                .iter()
                .map(|id| AgentConfig {
                    id: format!("internal-{id}"),
                    agent_id: id.to_string(),
                    name: format!("agent {id}"),
                    description: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_merges_and_sorts_descending_then_paginates() {
        let source = FakeSource::new()
            .with_agent("agent-a", vec![execution("1", "2024-01-02")])
            .with_agent("agent-b", vec![execution("2", "2024-01-03")]);
        let scope = vec!["agent-a".to_string(), "agent-b".to_string()];

        let merged = fetch_merged_executions(&source, &scope, None, None).await;
        let ids: Vec<&str> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);

        let page = paginate(
            merged,
            &PageRequest {
                page_number: 1,
                page_size: 1,
            },
        );
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, "2");
        assert_eq!(page.total_count, 2);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn test_failed_agent_contributes_zero_records() {
        let source = FakeSource::new()
            .with_agent("agent-ok", vec![execution("1", "2024-01-02")])
            .with_failing_agent("agent-down");
        let scope = vec!["agent-ok".to_string(), "agent-down".to_string()];

        let merged = fetch_merged_executions(&source, &scope, None, None).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "1");
    }

    #[tokio::test]
    async fn test_merges_batches_across_agents_most_recent_first() {
        let source = FakeSource::new()
            .with_batches("agent-a", vec![batch("b1", "2024-01-02")])
            .with_batches("agent-b", vec![batch("b2", "2024-01-03")])
            .with_failing_agent("agent-down");
        let scope = vec![
            "agent-a".to_string(),
            "agent-b".to_string(),
            "agent-down".to_string(),
        ];

        let merged = fetch_merged_batches(&source, &scope).await;
        let ids: Vec<&str> = merged.iter().map(|b| b.batch_id.as_str()).collect();
        assert_eq!(ids, vec!["b2", "b1"]);
    }

    #[tokio::test]
    async fn test_empty_scope_means_no_upstream_calls() {
        let source = FakeSource::new();
        let merged = fetch_merged_executions(&source, &[], None, None).await;
        assert!(merged.is_empty());
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unowned_agent_filter_is_denied_before_any_fetch() {
        let source = FakeSource::new().with_agent("agent-b", vec![execution("1", "2024-01-02")]);
        let member = caller(Role::Member, &["agent-a"]);

        let denied = resolve_agent_scope(&member, Some("agent-b"));

        assert!(denied.is_err());
        // Denial happens during scope resolution, so the upstream was never
        // touched for the requested agent.
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn test_admin_may_filter_on_any_agent() {
        let admin = caller(Role::Admin, &[]);
        let scope = resolve_agent_scope(&admin, Some("agent-b")).unwrap();
        assert_eq!(scope, vec!["agent-b".to_string()]);
    }

    #[test]
    fn test_absent_filter_scopes_to_owned_agents() {
        let member = caller(Role::Member, &["agent-a", "agent-b"]);
        let scope = resolve_agent_scope(&member, None).unwrap();
        assert_eq!(scope, vec!["agent-a".to_string(), "agent-b".to_string()]);
    }

    #[test]
    fn test_page_past_the_end_is_empty_but_totals_hold() {
        let items = vec![execution("1", "2024-01-02"), execution("2", "2024-01-03")];
        let page = paginate(
            items,
            &PageRequest {
                page_number: 3,
                page_size: 2,
            },
        );
        assert!(page.data.is_empty());
        assert_eq!(page.total_count, 2);
        assert_eq!(page.total_pages, 1);
    }
}
