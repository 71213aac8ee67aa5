use async_trait::async_trait;
use serde_json::Value;

use super::{check, UpstreamError};
use crate::models::{Batch, BatchListing, ExecutionPage};

pub const DEFAULT_API_URL: &str = "https://api.bolna.ai";

/// Query passed through to the per-agent execution listing.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQuery {
    pub page_number: u32,
    pub page_size: u32,
    pub status: Option<String>,
    pub call_type: Option<String>,
}

/// The slice of the provider API the aggregator fans out over. Split into a
/// trait so aggregation logic can be exercised against a simulated upstream.
#[async_trait]
pub trait ExecutionSource: Send + Sync {
    async fn list_executions(
        &self,
        agent_id: &str,
        query: &ExecutionQuery,
    ) -> Result<ExecutionPage, UpstreamError>;

    async fn list_batches(&self, agent_id: &str) -> Result<Vec<Batch>, UpstreamError>;
}

/// Bearer-token client for the conversational-AI telephony provider.
pub struct BolnaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BolnaClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    /// Fetch one execution in full.
    pub async fn get_execution(
        &self,
        agent_id: &str,
        execution_id: &str,
    ) -> Result<Value, UpstreamError> {
        let response = self
            .get(&format!("/v2/agent/{agent_id}/execution/{execution_id}"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Fetch the raw component log for one execution.
    pub async fn get_execution_log(&self, execution_id: &str) -> Result<Value, UpstreamError> {
        let response = self
            .get(&format!("/executions/{execution_id}/log"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Submit one "initiate call" request. Submit-and-acknowledge: returns as
    /// soon as the provider accepts the call, with no completion tracking.
    pub async fn initiate_call(&self, payload: &Value) -> Result<Value, UpstreamError> {
        let response = self.post("/v2/call").json(payload).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Upload a contact CSV, creating a new batch for the agent.
    pub async fn create_batch(
        &self,
        agent_id: &str,
        file_name: &str,
        csv: Vec<u8>,
    ) -> Result<Value, UpstreamError> {
        let form = reqwest::multipart::Form::new()
            .text("agent_id", agent_id.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(csv)
                    .file_name(file_name.to_string())
                    .mime_str("text/csv")?,
            );
        let response = self.post("/batches").multipart(form).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Schedule a batch for execution at the given RFC 3339 instant.
    pub async fn schedule_batch(
        &self,
        batch_id: &str,
        scheduled_at: &str,
    ) -> Result<Value, UpstreamError> {
        let form =
            reqwest::multipart::Form::new().text("scheduled_at", scheduled_at.to_string());
        let response = self
            .post(&format!("/batches/{batch_id}/schedule"))
            .multipart(form)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn stop_batch(&self, batch_id: &str) -> Result<Value, UpstreamError> {
        let response = self.post(&format!("/batches/{batch_id}/stop")).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn delete_batch(&self, batch_id: &str) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .delete(format!("{}/batches/{batch_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Fetch the per-contact execution results of a finished batch.
    pub async fn batch_executions(&self, batch_id: &str) -> Result<Value, UpstreamError> {
        let response = self
            .get(&format!("/batches/{batch_id}/executions"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl ExecutionSource for BolnaClient {
    async fn list_executions(
        &self,
        agent_id: &str,
        query: &ExecutionQuery,
    ) -> Result<ExecutionPage, UpstreamError> {
        let mut request = self
            .get(&format!("/v2/agent/{agent_id}/executions"))
            .query(&[
                ("page_number", query.page_number.to_string()),
                ("page_size", query.page_size.to_string()),
            ]);
        if let Some(status) = &query.status {
            request = request.query(&[("status", status)]);
        }
        if let Some(call_type) = &query.call_type {
            request = request.query(&[("call_type", call_type)]);
        }

        let response = request.send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list_batches(&self, agent_id: &str) -> Result<Vec<Batch>, UpstreamError> {
        let response = self.get(&format!("/batches/{agent_id}/all")).send().await?;
        let listing: BatchListing = check(response).await?.json().await?;
        Ok(listing.into_batches())
    }
}
