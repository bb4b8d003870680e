//! Remote job API: the three calls a poller needs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use scrape_hub_server_jobs::{CancelResponse, ExecutionId, JobSnapshot, StartResponse};
use serde::de::DeserializeOwned;

use crate::error::ApiCallError;

/// Header carrying the shared API secret.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Start, read and cancel jobs by key.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Start a job, or attach to the live execution for `key`.
    async fn start(&self, key: &str) -> Result<StartResponse, ApiCallError>;

    /// Snapshot of `key`'s latest execution, or of `execution` when given.
    /// A specific execution stays readable after a newer start replaced it,
    /// until the server evicts it; then the snapshot is idle.
    async fn snapshot(
        &self,
        key: &str,
        execution: Option<ExecutionId>,
    ) -> Result<JobSnapshot, ApiCallError>;

    async fn request_cancel(&self, key: &str) -> Result<CancelResponse, ApiCallError>;
}

/// `JobApi` over the scrape-hub HTTP routes.
#[derive(Debug, Clone)]
pub struct HttpJobApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpJobApi {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ApiCallError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiCallError::Transport {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str, key: &str) -> String {
        format!("{}/api/{route}/{key}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: String) -> Result<T, ApiCallError> {
        let request = match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        };
        let transport = |e: reqwest::Error| ApiCallError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Job API returned an error");
            return Err(ApiCallError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiCallError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn start(&self, key: &str) -> Result<StartResponse, ApiCallError> {
        let url = self.url("scrape", key);
        self.send(self.client.post(&url), url).await
    }

    async fn snapshot(
        &self,
        key: &str,
        execution: Option<ExecutionId>,
    ) -> Result<JobSnapshot, ApiCallError> {
        let mut url = self.url("scrape-progress", key);
        if let Some(id) = execution {
            url.push_str(&format!("?execution={id}"));
        }
        self.send(self.client.get(&url), url).await
    }

    async fn request_cancel(&self, key: &str) -> Result<CancelResponse, ApiCallError> {
        let url = self.url("scrape-cancel", key);
        self.send(self.client.post(&url), url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_trims_trailing_slash() {
        let api = HttpJobApi::new("http://localhost:8000/", None).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(
            api.url("scrape-progress", "seia"),
            "http://localhost:8000/api/scrape-progress/seia"
        );
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let api = HttpJobApi::new("http://localhost:8000", Some(String::new())).unwrap();
        assert!(api.api_key.is_none());
    }
}
