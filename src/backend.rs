//! Backend facade
//!
//! HTTP client for the model-hosting backend. Starting a pull returns an open
//! [`Transport`]; listing and health endpoints are one-shot JSON calls.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::PullError;
use crate::progress::event::format_bytes;
use crate::progress::{Transport, TransportKind};

pub mod event_stream;

/// Opens the transport for a pull. The registry depends only on this.
#[async_trait]
pub trait PullBackend: Send + Sync {
    /// Issue the initiating request for `key`. A non-2xx answer is
    /// `PullError::TransportRejected`.
    async fn open(&self, key: &str, kind: TransportKind) -> Result<Transport, PullError>;
}

/// A model installed on the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl LocalModel {
    /// Size as reported: numbers are bytes, strings are shown verbatim.
    pub fn display_size(&self) -> String {
        match &self.size {
            Some(Value::Number(n)) => n.as_u64().map(format_bytes).unwrap_or_else(|| n.to_string()),
            Some(Value::String(s)) => s.clone(),
            _ => "-".to_string(),
        }
    }
}

/// A model offered by the library and available to pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryModel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct ModelList<T> {
    #[serde(default = "Vec::new")]
    models: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub running: bool,
}

fn map_http_error(error: reqwest::Error) -> PullError {
    let status = error.status().map(|s| s.as_u16());
    let message = if error.is_timeout() {
        format!("Request timeout: {}", error)
    } else if error.is_connect() {
        format!("Connection error: {}", error)
    } else {
        format!("HTTP error: {}", error)
    };
    PullError::TransportRejected { status, message }
}

async fn ensure_success(response: Response) -> Result<Response, PullError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(PullError::TransportRejected {
        status: Some(status.as_u16()),
        message: body,
    })
}

pub struct BackendClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, PullError> {
        // No overall client timeout: pull bodies stay open for the whole download.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| PullError::Backend(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn open_push_channel(&self, name: &str) -> Result<Transport, PullError> {
        let url = format!("{}/pull/model", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(map_http_error)?;
        ensure_success(response).await?;

        let response = self
            .client
            .get(&url)
            .query(&[("name", name)])
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(map_http_error)?;
        let response = ensure_success(response).await?;
        debug!(model = %name, "Push channel opened");
        Ok(Transport::push_channel(event_stream::push_events(
            response.bytes_stream(),
        )))
    }

    async fn open_byte_stream(&self, model: &str) -> Result<Transport, PullError> {
        let url = format!("{}/api/pull-model", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": model }))
            .send()
            .await
            .map_err(map_http_error)?;
        let response = ensure_success(response).await?;
        debug!(model = %model, "Byte stream opened");
        Ok(Transport::byte_stream(
            response
                .bytes_stream()
                .map_err(|e| PullError::Transport(e.to_string())),
        ))
    }

    /// Models already installed on the backend.
    pub async fn list_local_models(&self) -> Result<Vec<LocalModel>, PullError> {
        let url = format!("{}/fetch/models", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| PullError::Backend(e.to_string()))?;
        let list: ModelList<LocalModel> = self.read_json(response, "local models").await?;
        Ok(list.models)
    }

    /// Models the library offers for pulling.
    pub async fn library_models(&self) -> Result<Vec<LibraryModel>, PullError> {
        let url = format!("{}/api/library-models", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| PullError::Backend(e.to_string()))?;
        let list: ModelList<LibraryModel> = self.read_json(response, "library models").await?;
        Ok(list.models)
    }

    /// One-shot health check. An unreachable backend is reported as not running.
    pub async fn backend_status(&self) -> BackendStatus {
        let url = format!("{}/api/ollama-status", self.base_url);
        let result = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await;
        let running = match result {
            Ok(response) if response.status().is_success() => response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("running").and_then(Value::as_bool))
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "Status check failed");
                false
            }
            Err(err) => {
                debug!(error = %err, "Status check unreachable");
                false
            }
        };
        BackendStatus { running }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
        what: &str,
    ) -> Result<T, PullError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PullError::Backend(format!(
                "Failed to fetch {}: status {}",
                what, status
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PullError::Backend(format!("Failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl PullBackend for BackendClient {
    async fn open(&self, key: &str, kind: TransportKind) -> Result<Transport, PullError> {
        info!(model = %key, transport = kind.as_str(), "Starting pull");
        match kind {
            TransportKind::PushChannel => self.open_push_channel(key).await,
            TransportKind::ByteStream => self.open_byte_stream(key).await,
        }
    }
}
