use crate::inspector::parse_document_marker;
use crate::traits::SemanticIndex;
use crate::{SearchMode, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const API_KEY_VAR: &str = "LIGHTRAG_API_KEY";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9621";

const BACKEND: &str = "lightrag";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client for a LightRAG HTTP server whose working directory is the storage dir.
pub struct LightRagClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl LightRagClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, ServiceError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn from_env(endpoint: &str) -> Result<Self, ServiceError> {
        Self::new(endpoint, std::env::var(API_KEY_VAR).ok())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ServiceError> {
        let url = self.endpoint.join(path)?;
        let mut request = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        Ok(request)
    }

    /// Polls the track status until every document queued under `track_id` has been
    /// processed. The first failed document fails the insert.
    async fn wait_for_pipeline(&self, track_id: &str) -> Result<(), ServiceError> {
        let path = format!("documents/track_status/{track_id}");
        loop {
            let response = self.request(Method::GET, &path)?.send().await?;
            let parsed = Self::checked(response).await?;
            let documents = parsed
                .get("documents")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let status_of = |document: &Value| {
                document
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_lowercase)
            };

            if let Some(failed) = documents
                .iter()
                .find(|document| status_of(document).as_deref() == Some("failed"))
            {
                let details = failed
                    .get("error_msg")
                    .or_else(|| failed.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("document processing failed")
                    .to_string();
                warn!(track_id, %details, "lightrag pipeline rejected document");
                return Err(ServiceError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details,
                });
            }

            if !documents.is_empty()
                && documents
                    .iter()
                    .all(|document| status_of(document).as_deref() == Some("processed"))
            {
                debug!(track_id, "lightrag pipeline finished");
                return Ok(());
            }

            debug!(track_id, documents = documents.len(), "lightrag pipeline still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn checked(response: Response) -> Result<Value, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {}", body.trim()),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SemanticIndex for LightRagClient {
    fn missing_credential(&self) -> Option<&'static str> {
        self.api_key.is_none().then_some(API_KEY_VAR)
    }

    async fn initialize_storages(&self) -> Result<(), ServiceError> {
        let response = self.request(Method::GET, "health")?.send().await?;
        let health = Self::checked(response).await?;
        debug!(endpoint = %self.endpoint, status = ?health.get("status"), "lightrag reachable");
        Ok(())
    }

    async fn finalize_storages(&self) -> Result<(), ServiceError> {
        // The server owns its storages and flushes them itself.
        debug!(endpoint = %self.endpoint, "lightrag session closed");
        Ok(())
    }

    async fn insert(&self, text: &str) -> Result<(), ServiceError> {
        let mut payload = json!({ "text": text });
        if let Some(name) = parse_document_marker(text) {
            payload["file_source"] = Value::String(name);
        }

        let response = self
            .request(Method::POST, "documents/text")?
            .json(&payload)
            .send()
            .await?;
        let parsed = Self::checked(response).await?;

        match parsed.get("status").and_then(Value::as_str) {
            Some("failure") => {
                return Err(ServiceError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: parsed
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("insert rejected")
                        .to_string(),
                })
            }
            Some("duplicated") => {
                debug!("lightrag already holds this text");
                return Ok(());
            }
            _ => {}
        }

        match parsed.get("track_id").and_then(Value::as_str) {
            Some(track_id) => self.wait_for_pipeline(track_id).await,
            None => Ok(()),
        }
    }

    async fn query(&self, text: &str, mode: SearchMode) -> Result<String, ServiceError> {
        let response = self
            .request(Method::POST, "query")?
            .json(&json!({ "query": text, "mode": mode.as_str() }))
            .send()
            .await?;
        let parsed = Self::checked(response).await?;

        parsed
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "query response has no `response` field".to_string(),
            })
    }
}
