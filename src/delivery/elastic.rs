//! Elasticsearch document store over HTTP
//!
//! Single documents go to `POST {url}/{target}/_doc`; batches go to
//! `POST {url}/_bulk` as NDJSON action/document line pairs. Responses with
//! status 429 or 5xx are reported as transport errors so the delivery client
//! retries them; other non-2xx statuses are final rejections. A 2xx bulk
//! response whose body cannot be read is never retried, since the cluster may
//! already hold the documents.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

use super::{BulkFailure, BulkOperation, BulkResponse, Document, DocumentStore};
use crate::config::ElasticConfig;
use crate::{IndexerError, Result};

const NDJSON: &str = "application/x-ndjson";

/// Document store backed by an Elasticsearch cluster
#[derive(Debug, Clone)]
pub struct ElasticStore {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ElasticStore {
    /// Create a store for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            IndexerError::transport_with_source("cannot build HTTP client", Box::new(e))
        })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Create a store from connection settings
    pub fn from_config(config: &ElasticConfig) -> Result<Self> {
        let store = Self::new(&config.url, config.timeout)?;
        Ok(match config.credentials() {
            Some((user, pass)) => store.with_basic_auth(user, pass),
            None => store,
        })
    }

    /// Authenticate every request with HTTP basic auth
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }
}

/// Turn a non-2xx response into the matching error
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = error_reason(&body).unwrap_or(body);

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(IndexerError::transport(format!("status {}: {}", status.as_u16(), reason)))
    } else {
        Err(IndexerError::Rejected { status: status.as_u16(), reason })
    }
}

/// Pull `error.reason` out of an Elasticsearch error body
fn error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error.get("reason").and_then(|r| r.as_str()) {
        Some(reason) => Some(reason.to_string()),
        None => error.as_str().map(str::to_string),
    }
}

fn ndjson_body(operations: &[BulkOperation]) -> Result<String> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "index": { "_index": op.target } });
        let document = serde_json::to_string(&op.document)
            .map_err(|e| IndexerError::validation("document", e.to_string()))?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&document);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct BulkReply {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl BulkReply {
    /// Per-operation accounting; missing items count as failures
    fn into_response(self, submitted: usize) -> BulkResponse {
        let mut response = BulkResponse::default();

        for position in 0..submitted {
            let item = self.items.get(position).and_then(|actions| actions.values().next());
            match item {
                Some(item) if (200..300).contains(&item.status) => response.succeeded += 1,
                Some(item) => response.failures.push(BulkFailure {
                    position,
                    status: item.status,
                    reason: item
                        .error
                        .as_ref()
                        .and_then(|e| e.get("reason"))
                        .and_then(|r| r.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                }),
                None => response.failures.push(BulkFailure {
                    position,
                    status: 0,
                    reason: "no item in bulk response".to_string(),
                }),
            }
        }

        response
    }
}

#[async_trait::async_trait]
impl DocumentStore for ElasticStore {
    async fn index(&self, target: &str, document: &Document) -> Result<()> {
        let url = format!("{}/{}/_doc", self.base_url, target);
        trace!("POST {}", url);

        let response = self.authorize(self.http.post(&url)).json(document).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }

        let url = format!("{}/_bulk", self.base_url);
        let body = ndjson_body(operations)?;
        debug!("POST {} with {} documents", url, operations.len());

        let response = self
            .authorize(self.http.post(&url))
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            IndexerError::unreadable_response(status, "bulk response body", Box::new(e))
        })?;
        let reply: BulkReply = serde_json::from_slice(&body).map_err(|e| {
            IndexerError::unreadable_response(status, "bulk response is not JSON", Box::new(e))
        })?;

        Ok(reply.into_response(operations.len()))
    }

    async fn ping(&self) -> Result<()> {
        let response = self.authorize(self.http.get(format!("{}/", self.base_url))).send().await?;
        check_status(response).await?;
        Ok(())
    }
}
