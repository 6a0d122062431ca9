//! HTTP client for a remote retrieval service.
//!
//! Wire format: `POST {endpoint}` with `{query, filters, top_k}`, answered by
//! `{hits: [RetrievalHit]}`.

use std::time::Duration;

use async_trait::async_trait;
use ragline_core::{Filters, RetrievalError, RetrievalHit, Retriever};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
    filters: &'a Filters,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    hits: Vec<RetrievalHit>,
}

/// Remote retrieval collaborator.
pub struct HttpRetriever {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_error(&self, err: reqwest::Error) -> RetrievalError {
        if err.is_timeout() {
            RetrievalError::Timeout(self.timeout.as_secs())
        } else if err.is_decode() {
            RetrievalError::InvalidResponse(err.to_string())
        } else {
            RetrievalError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        "http"
    }

    async fn retrieve(
        &self,
        query: &str,
        filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        let body = RetrievalRequest {
            query,
            filters,
            top_k,
        };

        debug!(endpoint = %self.endpoint, top_k, "Querying retrieval service");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Retrieval service returned error status");
            return Err(RetrievalError::Unavailable(format!(
                "status {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let parsed: RetrievalResponse = response.json().await.map_err(|e| self.map_error(e))?;
        Ok(parsed.hits)
    }
}
