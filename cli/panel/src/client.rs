//! HTTP client for the Pyrsia node.
//!
//! Endpoints used:
//! - `GET /v2`: health (200 means healthy)
//! - `GET /status`: node status, `peers_count`
//! - `POST /inspect/docker`: transparency log of an image
//! - `POST /build/docker`: request a build of an image
//!
//! The base URL is read from the [`NodeConfigStore`] on every call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pyrsia_node_config::NodeConfigStore;
use pyrsia_reconcile::{NodeProbe, ProbeError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

const SERVICE: &str = "pyrsia node";

/// Node status response.
#[derive(Debug, Clone, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    peers_count: Value,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    image: &'a str,
}

/// Pyrsia node client.
#[derive(Clone)]
pub struct NodeClient {
    client: reqwest::Client,
    store: Arc<NodeConfigStore>,
}

impl NodeClient {
    /// Create a new node client.
    pub fn new(store: Arc<NodeConfigStore>, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, store }
    }

    fn url(&self, path: &str) -> String {
        self.store.address().endpoint(path)
    }

    async fn post_image(&self, path: &str, identity: &str) -> Result<Value, ProbeError> {
        let url = self.url(path);
        debug!(url = %url, identity = %identity, "POST to node");

        let response = self
            .client
            .post(&url)
            .json(&ImageRequest { image: identity })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, url = %url, "Node request failed");
            return Err(ProbeError::Request(format!("{status} - {body}")));
        }

        let body = response.text().await.map_err(transport_error)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ProbeError::Protocol(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ProbeError {
    if e.is_connect() || e.is_timeout() {
        ProbeError::Unavailable {
            service: SERVICE,
            message: e.to_string(),
        }
    } else {
        ProbeError::Request(e.to_string())
    }
}

/// Build id out of a build response: a bare string or an object with `build_id`.
fn parse_build_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(map) => map
            .get("build_id")
            .or_else(|| map.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl NodeProbe for NodeClient {
    async fn probe_health(&self) -> bool {
        let url = self.url("/v2");
        match self.client.get(&url).send().await {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Node health");
                response.status() == StatusCode::OK
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Node health check failed");
                false
            }
        }
    }

    async fn peer_count(&self) -> Result<u64, ProbeError> {
        let response = self
            .client
            .get(self.url("/status"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Request(format!("status endpoint returned {status}")));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ProbeError::Protocol(e.to_string()))?;

        // Older nodes report the count as a string.
        let peers = match &body.peers_count {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            Value::Null => Some(0),
            _ => None,
        };
        peers.ok_or_else(|| ProbeError::Protocol(format!("invalid peers_count: {}", body.peers_count)))
    }

    async fn transparency_log(&self, identity: &str) -> Result<Vec<Value>, ProbeError> {
        match self.post_image("/inspect/docker", identity).await? {
            Value::Array(entries) => Ok(entries),
            Value::Null => Ok(Vec::new()),
            other => Err(ProbeError::Protocol(format!(
                "transparency log is not an array: {other}"
            ))),
        }
    }

    async fn request_build(&self, identity: &str) -> Result<Option<String>, ProbeError> {
        let response = self.post_image("/build/docker", identity).await?;
        Ok(parse_build_id(&response))
    }
}
