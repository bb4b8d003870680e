// crates/client/src/error.rs
use scrape_hub_server_jobs::ExecutionId;
use thiserror::Error;

/// Failure of a single call to the job API.
#[derive(Debug, Clone, Error)]
pub enum ApiCallError {
    /// The request never produced an HTTP response (refused, reset, timed out).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiCallError {
    /// Worth retrying on the next tick. 4xx responses and undecodable bodies
    /// will not get better by asking again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } => false,
        }
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reasons a polling run ends without observing a terminal snapshot.
///
/// A job that failed or was cancelled is not a `ClientError`: those arrive
/// as terminal snapshots.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not start job {key}: {source}")]
    Start {
        key: String,
        #[source]
        source: ApiCallError,
    },

    /// Too many consecutive transient failures. The job may still be running.
    #[error("server unreachable after {failures} consecutive failures: {last}")]
    Unreachable {
        failures: u32,
        #[source]
        last: ApiCallError,
    },

    #[error("server rejected request: {0}")]
    Rejected(#[source] ApiCallError),

    /// The execution being followed was evicted on the server before its
    /// terminal snapshot was seen.
    #[error("lost track of job {key} (execution {execution_id:?})")]
    Lost {
        key: String,
        execution_id: Option<ExecutionId>,
    },
}
