// Upstream provider clients.
//
// Every endpoint in this service is a thin translation over one of these two
// APIs: the conversational-AI telephony provider (executions, batches, call
// initiation) and the carrier (click-to-call, call logs). No retry, no
// backoff, no circuit breaking; a non-success response is surfaced to the
// caller with the upstream status and raw body.

pub mod bolna;
pub mod knowlarity;

pub use bolna::{BolnaClient, ExecutionQuery, ExecutionSource};
pub use knowlarity::{normalize_phone_number, KnowlarityClient};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status; the raw body is kept so it
    /// can be passed through to the caller.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Turn a non-success response into [`UpstreamError::Status`], keeping the
/// raw error body.
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}
